use std::env;

pub const ENV_APP: &str = "DYNAMAP_APP";
pub const ENV_STAGE: &str = "DYNAMAP_STAGE";
pub const ENV_STRICT: &str = "DYNAMAP_STRICT";

/// Mapper configuration
///
/// Controls table namespacing and how attribute misses are reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapperConfig {
    /// Application name appended to statically declared table names
    pub app: Option<String>,

    /// Deployment stage appended after the application name
    pub stage: Option<String>,

    /// Report reads of absent attributes as errors instead of `None`
    pub strict_attributes: bool,
}

impl MapperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from `DYNAMAP_APP`, `DYNAMAP_STAGE` and `DYNAMAP_STRICT`.
    ///
    /// Empty variables count as unset.
    pub fn from_env() -> Self {
        let read = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            app: read(ENV_APP),
            stage: read(ENV_STAGE),
            strict_attributes: read(ENV_STRICT)
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    /// Set the application name
    pub fn app(mut self, app: &str) -> Self {
        self.app = Some(app.to_string());
        self
    }

    /// Set the deployment stage
    pub fn stage(mut self, stage: &str) -> Self {
        self.stage = Some(stage.to_string());
        self
    }

    /// Fail on reads of absent attributes
    pub fn strict_attributes(mut self, strict: bool) -> Self {
        self.strict_attributes = strict;
        self
    }

    /// Namespaced physical name for a declared table name.
    pub fn qualify_table_name(&self, table_name: &str) -> String {
        let mut name = table_name.to_string();
        if let Some(app) = &self.app {
            name.push('_');
            name.push_str(app);
        }
        if let Some(stage) = &self.stage {
            name.push('_');
            name.push_str(stage);
        }
        name
    }
}
