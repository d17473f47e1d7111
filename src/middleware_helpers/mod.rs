pub mod chat_session;
pub mod request_id;

pub use chat_session::{forwarded_user_middleware, AuthenticatedUser, ChatIdentity};
pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
