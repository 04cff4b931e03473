pub mod categories;
pub mod events;
pub mod expenses;
pub mod messages;
pub mod users;
pub mod verdict;
