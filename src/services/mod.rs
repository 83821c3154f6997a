pub mod attendance;
pub mod clock_in_codes;
pub mod configuration;
pub mod leave_approval;
pub mod leave_request;
pub mod notification;
pub mod overtime;
pub mod quota_ledger;
pub mod validation;

pub use attendance::AttendanceService;
pub use clock_in_codes::ClockInCodes;
pub use configuration::{ConfigurationService, LeadTimeRule};
pub use leave_approval::LeaveApprovalService;
pub use leave_request::LeaveRequestService;
pub use notification::{
    LocalNotifier, LogMailer, Mailer, NotificationKind, NotificationService, Notifier,
    NotifierPruner,
};
pub use overtime::OvertimeService;
pub use quota_ledger::QuotaLedger;
