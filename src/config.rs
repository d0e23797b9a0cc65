use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub worker: WorkerConfig,
    pub llm: LlmConfig,
    pub adaptive: AdaptiveConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub session_max_idle_hours: i64,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub mock: bool,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

/// Tuning knobs for the adaptive core. Immutable after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveConfig {
    pub initial_skill_rating: f64,
    pub initial_uncertainty: f64,
    pub base_k_factor: f64,
    pub uncertainty_decay: f64,
    pub uncertainty_floor: f64,
    pub mastery_threshold: f64,
    pub target_success_rate: f64,
    pub recent_window: usize,
    pub elo_scale_factor: f64,
    pub max_generation_attempts: u32,
    pub calibration_gain: f64,
    /// Focus-selection penalty for repeating the last practiced concept.
    pub recency_penalty: f64,
    /// Focus-selection bonus for concepts with zero attempts.
    pub virgin_bonus: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            initial_skill_rating: 800.0,
            initial_uncertainty: 350.0,
            base_k_factor: 64.0,
            uncertainty_decay: 0.90,
            uncertainty_floor: 50.0,
            mastery_threshold: 0.75,
            target_success_rate: 0.80,
            recent_window: 30,
            elo_scale_factor: 400.0,
            max_generation_attempts: 3,
            calibration_gain: 500.0,
            recency_penalty: 0.30,
            virgin_bonus: 0.20,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/tutor.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                session_max_idle_hours: env_or_parse("SESSION_MAX_IDLE_HOURS", 12_i64),
            },
            llm: LlmConfig {
                base_url: env_or("OLLAMA_BASE_URL", "http://localhost:11434"),
                model: env_or("OLLAMA_MODEL", "qwen3:8b"),
                mock: env_or_bool("LLM_MOCK", false),
                timeout_secs: env_or_parse("LLM_TIMEOUT_SECS", 120_u64),
                max_tokens: env_or_parse("LLM_MAX_TOKENS", 512_u32),
            },
            adaptive: AdaptiveConfig::from_env(),
        }
    }
}

impl AdaptiveConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            initial_skill_rating: env_or_parse(
                "ADAPTIVE_INITIAL_SKILL_RATING",
                d.initial_skill_rating,
            ),
            initial_uncertainty: env_or_parse("ADAPTIVE_INITIAL_UNCERTAINTY", d.initial_uncertainty),
            base_k_factor: env_or_parse("ADAPTIVE_BASE_K_FACTOR", d.base_k_factor),
            uncertainty_decay: env_or_parse("ADAPTIVE_UNCERTAINTY_DECAY", d.uncertainty_decay),
            uncertainty_floor: env_or_parse("ADAPTIVE_UNCERTAINTY_FLOOR", d.uncertainty_floor),
            mastery_threshold: env_or_parse("ADAPTIVE_MASTERY_THRESHOLD", d.mastery_threshold),
            target_success_rate: env_or_parse("ADAPTIVE_TARGET_SUCCESS_RATE", d.target_success_rate),
            recent_window: env_or_parse("ADAPTIVE_RECENT_WINDOW", d.recent_window),
            elo_scale_factor: env_or_parse("ADAPTIVE_ELO_SCALE_FACTOR", d.elo_scale_factor),
            max_generation_attempts: env_or_parse(
                "ADAPTIVE_MAX_GENERATION_ATTEMPTS",
                d.max_generation_attempts,
            ),
            calibration_gain: env_or_parse("ADAPTIVE_CALIBRATION_GAIN", d.calibration_gain),
            recency_penalty: env_or_parse("ADAPTIVE_RECENCY_PENALTY", d.recency_penalty),
            virgin_bonus: env_or_parse("ADAPTIVE_VIRGIN_BONUS", d.virgin_bonus),
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
