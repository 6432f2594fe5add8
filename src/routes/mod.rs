pub mod belbin_routes;
pub mod employee_routes;
pub mod health;
pub mod position_routes;
pub mod test_routes;
