// Regwatch Infrastructure - Mail Adapter
// Implements: ReportNotifier over SMTP

pub mod smtp_notifier;

pub use smtp_notifier::{SmtpNotifier, SmtpSettings};
