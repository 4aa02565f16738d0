use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A bundled or caller-supplied resource failed validation.
    #[error("Invalid definition {resource}: {message}")]
    Schema { resource: String, message: String },

    #[error("Unsupported configuration: expected exactly one architecture, got {0:?}")]
    UnsupportedConfiguration(Vec<String>),

    #[error("Unsupported architecture {0}")]
    UnsupportedArchitecture(String),

    #[error("Unsupported model_type {model_type} for architecture {architecture}")]
    UnsupportedModelType {
        architecture: String,
        model_type: String,
    },

    #[error("Template error in {template:?}: {message}")]
    Template { template: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Layer index {index} out of range for {num_layers} layers")]
    LayerOutOfRange { index: usize, num_layers: usize },

    #[error("Invalid {segment} override: {message}")]
    InvalidOverride {
        segment: &'static str,
        message: String,
    },
}

impl Error {
    pub(crate) fn schema(resource: impl Into<String>, message: impl ToString) -> Self {
        Self::Schema {
            resource: resource.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn template(template: &str, message: impl Into<String>) -> Self {
        Self::Template {
            template: template.to_owned(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
