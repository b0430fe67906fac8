pub mod context;
pub mod convert;
pub mod count;
pub mod error;
pub mod runner;

pub use context::{PipelineContext, PipelineRequest};
pub use convert::{ConvertError, DocumentConverter, OfficeConverter};
pub use count::{
    count_pages, counter_from_config, CountError, PageCounter, SubprocessPageCounter,
    ThreadPageCounter, COUNT_PAGES_COMMAND,
};
pub use error::PipelineError;
pub use runner::Pipeline;
