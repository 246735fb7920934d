pub mod forecast;
pub mod history;
pub mod schedule;
pub mod sensor;
