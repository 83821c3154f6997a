use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::macros::string_enum;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    /// `None` marks a manager or HR member: they approve their own leave.
    pub manager_id: Option<Uuid>,
    pub status: EmployeeStatus,
    pub contract_type: ContractType,
}

impl Employee {
    pub fn is_staff(&self) -> bool {
        self.manager_id.is_some()
    }

    pub fn first_name(&self) -> &str {
        self.full_name.split_whitespace().next().unwrap_or(&self.full_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeBiodata {
    pub employee_id: Uuid,
    pub marital_status: bool,
}

string_enum! {
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum EmployeeStatus {
        Available => "AVAILABLE",
        Unavailable => "UNAVAILABLE",
        OnLeave => "ON_LEAVE",
        Resigned => "RESIGNED",
    }
}

string_enum! {
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum ContractType {
        FullTime => "FULL_TIME",
        Contract => "CONTRACT",
        Intern => "INTERN",
    }
}
