pub mod notifier;

pub use notifier::{audience_for, notices_for, BroadcastSink, NoticeSink, Notifier, OrderNotice};
