/// Maximum retries for compare-and-swap store operations.
pub const MAX_CAS_RETRIES: u32 = 20;

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Maximum page size for list endpoints.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Cap on dedup hints forwarded to the LLM prompt.
pub const MAX_PROMPT_HINTS: usize = 40;

/// Temperature for item generation.
pub const GENERATION_TEMPERATURE: f64 = 0.7;

/// Temperature for LLM answer grading.
pub const GRADING_TEMPERATURE: f64 = 0.3;

/// Temperature for wrong-answer explanations.
pub const EXPLAIN_TEMPERATURE: f64 = 0.5;
