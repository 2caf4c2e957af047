pub mod db_utils;
pub mod email_cache;
pub mod email_filter;
pub mod listing;
pub mod query_cache;
pub mod validation;
