pub mod category;
pub mod chat_message;
pub mod order;
pub mod order_item;
pub mod product;
pub mod user;
