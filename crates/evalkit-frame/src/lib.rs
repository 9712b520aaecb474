pub mod ingest;
pub mod table;
pub mod transform;

pub use ingest::{CsvIngestor, Ingestor, JsonIngestor, StaticIngestor};
pub use table::{Cell, Column, DType, Table};
pub use transform::{
    CastTransformer, DropNullsTransformer, RenameTransformer, SelectTransformer,
    SequentialTransformer, Transformer,
};
