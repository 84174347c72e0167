// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `tracing` layer feeding the per-request capture.

use std::fmt::{self, Write as _};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use super::{append, is_active, LogRecord};

/// Target prefix of this crate's own events, which are never captured.
const OWN_TARGET: &str = "apiscope";

/// Turns `tracing` events emitted inside a capture scope into [`LogRecord`]s.
///
/// Events outside any scope cost one task-local lookup.
#[derive(Debug, Clone, Default)]
pub struct CaptureLayer {
    _private: (),
}

impl CaptureLayer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_own_target(metadata.target()) || !is_active() {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        append(LogRecord::new(metadata.level().as_str(), visitor.finish()).with_logger(metadata.target()));
    }
}

fn is_own_target(target: &str) -> bool {
    target == OWN_TARGET
        || target
            .strip_prefix(OWN_TARGET)
            .is_some_and(|rest| rest.starts_with("::"))
}

/// Formats the `message` field followed by the remaining fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{}", value));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push_field(field.name(), format_args!("{}", value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::scope;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_own_target_detection() {
        assert!(is_own_target("apiscope"));
        assert!(is_own_target("apiscope::client::sync"));
        assert!(!is_own_target("apiscopes"));
        assert!(!is_own_target("my_app::handlers"));
    }

    #[tokio::test]
    async fn test_layer_captures_events_in_scope() {
        let subscriber = tracing_subscriber::registry().with(CaptureLayer::new());
        let _default = tracing::subscriber::set_default(subscriber);

        tracing::info!(target: "my_app", "outside scope");

        let (_, records) = scope(async {
            tracing::warn!(target: "my_app::orders", order_id = 7, "order delayed");
            tracing::info!(target: "apiscope::client", "internal");
        })
        .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, "WARN");
        assert_eq!(records[0].logger.as_deref(), Some("my_app::orders"));
        assert_eq!(records[0].message, "order delayed order_id=7");
    }
}
