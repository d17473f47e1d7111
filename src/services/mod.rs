pub mod analytics;
pub mod catalog;
pub mod charts;
pub mod chat;
pub mod comparison;
pub mod dispatcher;
pub mod fallback;
pub mod llm;
pub mod reports;
pub mod stock_report;

#[cfg(test)]
pub(crate) mod test_fixtures;
