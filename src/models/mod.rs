pub mod company;
pub mod daily_price;
pub mod raw;
pub mod schema;
