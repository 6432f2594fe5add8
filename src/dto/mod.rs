pub mod belbin_dto;
pub mod employee_dto;
pub mod position_dto;
pub mod test_dto;
