pub mod coverage;
pub mod diagnostic;
pub mod document;
pub mod enums;
pub mod facts;
pub mod line_item;
pub mod service_date;
pub mod value;

pub use coverage::*;
pub use diagnostic::*;
pub use document::*;
pub use enums::*;
pub use facts::*;
pub use line_item::NormalizedLineItem;
pub use service_date::ServiceDate;
pub use value::*;
