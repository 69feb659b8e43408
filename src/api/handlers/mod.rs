pub mod health;
pub mod offerings;
pub mod sparql;
