//! Read operations on BrAPI objects

pub mod fetch;
pub mod search;
pub mod server_info;

pub use fetch::FetchObjectsQuery;
pub use search::{SearchObjectsQuery, SearchReply, SearchResultsQuery};
pub use server_info::ServerInfoQuery;
