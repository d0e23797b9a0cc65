pub mod answers;
pub mod explainer;
pub mod generation;
pub mod llm;
pub mod llm_json;
pub mod precache;
pub mod sessions;
