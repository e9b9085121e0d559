pub mod domain;
pub mod ports;

pub use domain::{
    DeleteAck, Document, DocumentId, DocumentView, FieldMap, InsertAck, IntoDocumentId, Query,
    UpdateAck, User,
};
pub use ports::{BoxError, Clock, PortError, PortResult, SystemClock, UserStore};
