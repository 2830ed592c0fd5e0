mod registry;
mod template;
mod time_format;

pub use registry::{
    ConfigKey, ConfigRegistry, ModelConfig, Vocabulary, COORDS, DIMS, REGISTRY_ENV,
};
pub use template::{FilenameTemplate, RenderContext, RenderedPattern, TemplateRoot};
pub use time_format::TimeFormat;
