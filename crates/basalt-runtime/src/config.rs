//! Context configuration.

/// Options applied when an [`AcceleratorContext`](crate::AcceleratorContext) is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Reported to the driver in the application descriptor; informational only.
    pub application_name: String,
    pub application_version: u32,
    /// Request `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub enable_validation: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            application_name: "basalt".to_string(),
            application_version: 1,
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl ContextConfig {
    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    pub fn with_application(mut self, name: impl Into<String>, version: u32) -> Self {
        self.application_name = name.into();
        self.application_version = version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ContextConfig::default();
        assert_eq!(config.application_name, "basalt");
        assert_eq!(config.application_version, 1);
        assert_eq!(config.enable_validation, cfg!(debug_assertions));
    }

    #[test]
    fn test_config_overrides() {
        let config = ContextConfig::default()
            .with_application("mnist-copy", 3)
            .with_validation(false);
        assert_eq!(config.application_name, "mnist-copy");
        assert_eq!(config.application_version, 3);
        assert!(!config.enable_validation);
    }
}
