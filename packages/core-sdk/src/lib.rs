pub mod convert;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod server;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use convert::call_ai_model;
pub use error::{ConvertError, ProviderError};
pub use llm::ToneClient;
pub use models::{ProviderId, ToneCategory, ToneResult};

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::convert;
    pub use crate::db;
    pub use crate::error;
    pub use crate::llm;
    pub use crate::models;
    pub use crate::server;
    pub use crate::telemetry;
}
