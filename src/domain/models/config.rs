use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::phase::{AdversaryPhase, LikelihoodMode, SmoothingPolicy};

/// Main configuration structure for the convergence engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Independence scorer configuration
    #[serde(default)]
    pub independence: IndependenceConfig,

    /// Hawkes burst detector configuration
    #[serde(default)]
    pub hawkes: HawkesConfig,

    /// Hidden Markov phase model
    #[serde(default)]
    pub phase_model: PhaseModelConfig,

    /// Fusion and decision policy
    #[serde(default)]
    pub fusion: FusionConfig,

    /// Fast/slow path cadence
    #[serde(default)]
    pub scoring_loop: LoopConfig,

    /// HTTP query surface
    #[serde(default)]
    pub server: ServerConfig,

    /// Embedding and observation collaborators
    #[serde(default)]
    pub collaborators: CollaboratorConfig,

    /// Payload audit trail
    #[serde(default)]
    pub audit: AuditConfig,

    /// Scoring session keys served by this engine
    #[serde(default = "default_sessions")]
    pub sessions: Vec<String>,
}

fn default_sessions() -> Vec<String> {
    vec!["default".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            independence: IndependenceConfig::default(),
            hawkes: HawkesConfig::default(),
            phase_model: PhaseModelConfig::default(),
            fusion: FusionConfig::default(),
            scoring_loop: LoopConfig::default(),
            server: ServerConfig::default(),
            collaborators: CollaboratorConfig::default(),
            audit: AuditConfig::default(),
            sessions: default_sessions(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation policy for file logs: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Mirror logs to stdout when file logging is enabled
    #[serde(default = "default_true")]
    pub enable_stdout: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            enable_stdout: default_true(),
        }
    }
}

/// Independence scorer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IndependenceConfig {
    /// Pivot magnitude at or below which a column counts as dependent
    #[serde(default = "default_rank_tolerance")]
    pub rank_tolerance: f64,

    /// Number of most recent fragments scored per refresh (0 = all)
    #[serde(default = "default_subset_window")]
    pub subset_window: usize,

    /// Cardinality bound for greedy basis selection
    #[serde(default = "default_max_basis")]
    pub max_basis: usize,
}

const fn default_rank_tolerance() -> f64 {
    1e-6
}

const fn default_subset_window() -> usize {
    64
}

const fn default_max_basis() -> usize {
    16
}

impl Default for IndependenceConfig {
    fn default() -> Self {
        Self {
            rank_tolerance: default_rank_tolerance(),
            subset_window: default_subset_window(),
            max_basis: default_max_basis(),
        }
    }
}

/// Hawkes burst detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HawkesConfig {
    /// Baseline intensity (events per second)
    #[serde(default = "default_mu")]
    pub mu: f64,

    /// Excitation added by each event
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Exponential decay rate of excitation (per second)
    #[serde(default = "default_beta")]
    pub beta: f64,

    /// Intensity divisor used to normalize H1 into `[0, 1]`
    #[serde(default = "default_h1_divisor")]
    pub h1_divisor: f64,

    /// Intensity above which the stream is reported as bursting
    #[serde(default = "default_burst_threshold")]
    pub burst_threshold: f64,

    /// Age beyond which events are evicted; derived from the decay rate when unset
    #[serde(default)]
    pub eviction_horizon_secs: Option<f64>,
}

const fn default_mu() -> f64 {
    0.5
}

const fn default_alpha() -> f64 {
    0.8
}

const fn default_beta() -> f64 {
    1.0
}

const fn default_h1_divisor() -> f64 {
    5.0
}

const fn default_burst_threshold() -> f64 {
    3.0
}

impl Default for HawkesConfig {
    fn default() -> Self {
        Self {
            mu: default_mu(),
            alpha: default_alpha(),
            beta: default_beta(),
            h1_divisor: default_h1_divisor(),
            burst_threshold: default_burst_threshold(),
            eviction_horizon_secs: None,
        }
    }
}

/// Hidden Markov phase model. Symbols are indices into each emission row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PhaseModelConfig {
    pub states: Vec<AdversaryPhase>,
    pub initial: Vec<f64>,
    pub transition: Vec<Vec<f64>>,
    pub emission: Vec<Vec<f64>>,
    #[serde(default)]
    pub smoothing: SmoothingPolicy,
}

impl Default for PhaseModelConfig {
    fn default() -> Self {
        // Symbols: 0 = recon/scan, 1 = access/stage, 2 = impact
        Self {
            states: vec![
                AdversaryPhase::Reconnaissance,
                AdversaryPhase::Staging,
                AdversaryPhase::Execution,
            ],
            initial: vec![0.6, 0.3, 0.1],
            transition: vec![
                vec![0.7, 0.2, 0.1],
                vec![0.1, 0.6, 0.3],
                vec![0.05, 0.15, 0.8],
            ],
            emission: vec![
                vec![0.7, 0.2, 0.1],
                vec![0.2, 0.6, 0.2],
                vec![0.1, 0.2, 0.7],
            ],
            smoothing: SmoothingPolicy::None,
        }
    }
}

/// Severity weight applied to each estimated phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PhaseSeverity {
    #[serde(default)]
    pub dormant: f64,
    #[serde(default = "default_reconnaissance_severity")]
    pub reconnaissance: f64,
    #[serde(default = "default_staging_severity")]
    pub staging: f64,
    #[serde(default = "default_execution_severity")]
    pub execution: f64,
    #[serde(default)]
    pub unknown: f64,
}

const fn default_reconnaissance_severity() -> f64 {
    0.4
}

const fn default_staging_severity() -> f64 {
    0.7
}

const fn default_execution_severity() -> f64 {
    1.0
}

impl PhaseSeverity {
    pub const fn weight(&self, phase: AdversaryPhase) -> f64 {
        match phase {
            AdversaryPhase::Dormant => self.dormant,
            AdversaryPhase::Reconnaissance => self.reconnaissance,
            AdversaryPhase::Staging => self.staging,
            AdversaryPhase::Execution => self.execution,
            AdversaryPhase::Unknown => self.unknown,
        }
    }
}

impl Default for PhaseSeverity {
    fn default() -> Self {
        Self {
            dormant: 0.0,
            reconnaissance: default_reconnaissance_severity(),
            staging: default_staging_severity(),
            execution: default_execution_severity(),
            unknown: 0.0,
        }
    }
}

/// Combined-score bars for vertical escalation out of each non-terminal tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EscalationBars {
    #[serde(default = "default_local_bar")]
    pub local: f64,
    #[serde(default = "default_intermediate_bar")]
    pub intermediate: f64,
}

const fn default_local_bar() -> f64 {
    1.5
}

const fn default_intermediate_bar() -> f64 {
    1.8
}

impl Default for EscalationBars {
    fn default() -> Self {
        Self {
            local: default_local_bar(),
            intermediate: default_intermediate_bar(),
        }
    }
}

/// Fusion and decision policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FusionConfig {
    /// Convergence line both H1 and H2 must clear
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Half-life of semantic score decay, in seconds
    #[serde(default = "default_half_life_secs")]
    pub half_life_secs: f64,

    /// Age after which a payload is treated as weak evidence, in seconds
    #[serde(default = "default_validity_window_secs")]
    pub validity_window_secs: f64,

    /// Ascending lower bounds of the four escalation bands
    #[serde(default = "default_bands")]
    pub bands: [f64; 4],

    /// Share of the semantic score contributed by the phase signal
    #[serde(default = "default_phase_weight")]
    pub phase_weight: f64,

    /// Likelihood form multiplied into the phase signal
    #[serde(default)]
    pub likelihood_mode: LikelihoodMode,

    #[serde(default)]
    pub severity: PhaseSeverity,

    #[serde(default)]
    pub escalation: EscalationBars,
}

const fn default_threshold() -> f64 {
    0.75
}

const fn default_half_life_secs() -> f64 {
    300.0
}

const fn default_validity_window_secs() -> f64 {
    600.0
}

const fn default_bands() -> [f64; 4] {
    [0.75, 0.80, 0.85, 0.90]
}

const fn default_phase_weight() -> f64 {
    0.25
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            half_life_secs: default_half_life_secs(),
            validity_window_secs: default_validity_window_secs(),
            bands: default_bands(),
            phase_weight: default_phase_weight(),
            likelihood_mode: LikelihoodMode::default(),
            severity: PhaseSeverity::default(),
            escalation: EscalationBars::default(),
        }
    }
}

/// Fast/slow path cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoopConfig {
    /// Fast path tick interval in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Slow path refresh interval in milliseconds
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Hard timeout for one refresh, in milliseconds
    #[serde(default = "default_refresh_timeout_ms")]
    pub refresh_timeout_ms: u64,

    /// Capacity of the pending event channel feeding the fast path
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

const fn default_tick_interval_ms() -> u64 {
    1
}

const fn default_refresh_interval_ms() -> u64 {
    5_000
}

const fn default_refresh_timeout_ms() -> u64 {
    250
}

const fn default_event_buffer() -> usize {
    4_096
}

impl LoopConfig {
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub const fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            refresh_interval_ms: default_refresh_interval_ms(),
            refresh_timeout_ms: default_refresh_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// HTTP query surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Socket address to bind
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8089".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Embedding and observation collaborators
///
/// When `base_url` is set the remote HTTP collaborator is used; otherwise
/// fragments and observations come from the scenario file (or start empty).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CollaboratorConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub scenario_path: Option<PathBuf>,

    /// Per-request timeout for remote collaborators, in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

const fn default_request_timeout_ms() -> u64 {
    200
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            scenario_path: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Payload audit trail
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditConfig {
    /// JSON-lines file receiving every published payload (disabled when unset)
    #[serde(default)]
    pub path: Option<PathBuf>,
}
