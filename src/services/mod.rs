pub mod mailer;
pub mod notifier;
pub mod reconciler;
