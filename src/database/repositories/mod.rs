pub mod attendance_repository;
pub mod configuration_repository;
pub mod employee_repository;
pub mod leave_repository;
pub mod overtime_repository;
pub mod quota_repository;

// Re-export all repositories for easy importing
pub use attendance_repository::AttendanceRepository;
pub use configuration_repository::ConfigurationRepository;
pub use employee_repository::EmployeeRepository;
pub use leave_repository::LeaveRepository;
pub use overtime_repository::OvertimeRepository;
pub use quota_repository::QuotaRepository;
