pub mod config;
pub mod daemon;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod providers;
pub mod scheduler;

pub mod domains {
    pub mod capability;
    pub mod execution;
}

pub mod interfaces {
    pub mod handlers;
    pub mod scheduler;
}

pub mod security {
    pub mod redact;
}

pub mod services {
    pub mod diagnostics;
    pub mod eligibility;
    pub mod executor;
    pub mod health;
    pub mod validator;
}

pub use error::IfritError;

pub type Result<T> = std::result::Result<T, IfritError>;

pub const GIT_SHA: &str = env!("IFRIT_GIT_SHA");
