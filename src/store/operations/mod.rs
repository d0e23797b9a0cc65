pub mod attempts;
pub mod curriculum;
pub mod history;
pub mod items;
pub mod learners;
pub mod sessions;
pub mod skills;
