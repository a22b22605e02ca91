//! Source ingestion: reading raw sources and turning them into graphs.

pub mod reader;
pub mod sources;

pub use reader::SourceReader;
pub use sources::{
    parse_option, DataSource, DataSourceRegistry, JsonDataSource, JsonOptions, ParameterSpec, RdfDataSource,
    SourceOptions, XmlDataSource, XmlOptions,
};
