pub mod belbin;
pub mod employee;
pub mod position;
pub mod question;
pub mod test;
