//! Context synchronizer.
//!
//! Before each prompt, the messages strictly between the session's
//! processed prefix and the newest message are folded into the session,
//! in order, exactly once. Assistant messages in that slice are the
//! model's own prior output, already implicit in the session, and are
//! never re-injected. The newest message is the prompt of the new turn
//! and is not appended here.

use crate::local::session::SessionManager;
use tandem_application::ports::generative::RuntimeError;
use tandem_domain::{Message, Role};
use tracing::trace;

/// Fold the not-yet-processed slice of `conversation` into the session.
///
/// Returns how many messages were appended. The processed count advances
/// by one per successful append; skipped messages (assistant-authored, or
/// empty after trimming) do not move it.
pub async fn sync_context(
    manager: &mut SessionManager,
    conversation: &[Message],
) -> Result<usize, RuntimeError> {
    let end = conversation.len().saturating_sub(1);
    let start = manager.processed().min(end);
    let mut appended = 0;

    for message in &conversation[start..end] {
        if message.role == Role::Assistant {
            trace!(id = %message.id, "skipping assistant message already implicit in session");
            continue;
        }
        if !message.has_text() {
            trace!(id = %message.id, "skipping message with no text content");
            continue;
        }
        manager.append(message).await?;
        appended += 1;
    }

    Ok(appended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::fakes::{FakeRuntime, FakeTurn};
    use std::sync::Arc;
    use tandem_application::ports::generative::{GenerativeRuntime, SessionOptions};
    use tokio_util::sync::CancellationToken;

    async fn manager_for(runtime: Arc<FakeRuntime>) -> SessionManager {
        let mut manager = SessionManager::new(
            runtime as Arc<dyn GenerativeRuntime>,
            SessionOptions::default(),
            None,
            CancellationToken::new(),
        );
        // A session must exist before syncing; prime it on an empty
        // conversation so nothing is consumed by creation.
        manager.ensure_session(&[]).await.unwrap();
        manager
    }

    #[tokio::test]
    async fn appends_only_the_unprocessed_middle() {
        let runtime = FakeRuntime::with_turns(vec![FakeTurn::done(&[])]);
        let mut manager = manager_for(Arc::clone(&runtime)).await;

        let conversation = vec![
            Message::with_id("m1", Role::User, "first"),
            Message::with_id("m2", Role::User, "second"),
            Message::with_id("m3", Role::User, "the prompt"),
        ];

        let appended = sync_context(&mut manager, &conversation).await.unwrap();
        assert_eq!(appended, 2);
        assert_eq!(manager.processed(), 2);

        let log = runtime.snapshot();
        assert_eq!(log.appends.len(), 2);
        assert_eq!(log.appends[0].1, "first");
        assert_eq!(log.appends[1].1, "second");
    }

    #[tokio::test]
    async fn the_newest_message_is_never_appended() {
        let runtime = FakeRuntime::with_turns(vec![]);
        let mut manager = manager_for(Arc::clone(&runtime)).await;

        let conversation = vec![Message::with_id("m1", Role::User, "only the prompt")];
        let appended = sync_context(&mut manager, &conversation).await.unwrap();

        assert_eq!(appended, 0);
        assert!(runtime.snapshot().appends.is_empty());
    }

    #[tokio::test]
    async fn assistant_messages_are_skipped_without_count() {
        let runtime = FakeRuntime::with_turns(vec![]);
        let mut manager = manager_for(Arc::clone(&runtime)).await;

        let conversation = vec![
            Message::with_id("m1", Role::Assistant, "prior model output"),
            Message::with_id("m2", Role::User, "context"),
            Message::with_id("m3", Role::User, "prompt"),
        ];

        let appended = sync_context(&mut manager, &conversation).await.unwrap();
        assert_eq!(appended, 1);
        assert_eq!(runtime.snapshot().appends[0].1, "context");
    }

    #[tokio::test]
    async fn empty_messages_are_skipped_without_count() {
        let runtime = FakeRuntime::with_turns(vec![]);
        let mut manager = manager_for(Arc::clone(&runtime)).await;

        let conversation = vec![
            Message::with_id("m1", Role::User, "   \n"),
            Message::with_id("m2", Role::User, "real context"),
            Message::with_id("m3", Role::User, "prompt"),
        ];

        let appended = sync_context(&mut manager, &conversation).await.unwrap();
        assert_eq!(appended, 1);
        assert_eq!(manager.processed(), 1);
    }

    #[tokio::test]
    async fn already_processed_prefix_is_not_revisited() {
        let runtime = FakeRuntime::with_turns(vec![]);
        let mut manager = manager_for(Arc::clone(&runtime)).await;

        let conversation = vec![
            Message::with_id("m1", Role::User, "a"),
            Message::with_id("m2", Role::User, "b"),
            Message::with_id("m3", Role::User, "prompt"),
        ];

        sync_context(&mut manager, &conversation).await.unwrap();
        // Syncing the same conversation again folds nothing new.
        let appended = sync_context(&mut manager, &conversation).await.unwrap();
        assert_eq!(appended, 0);
        assert_eq!(runtime.snapshot().appends.len(), 2);
    }

    #[tokio::test]
    async fn append_failure_propagates() {
        let runtime = FakeRuntime::with_turns(vec![]);
        runtime.set_fail_append(true);
        let mut manager = manager_for(Arc::clone(&runtime)).await;

        let conversation = vec![
            Message::with_id("m1", Role::User, "context"),
            Message::with_id("m2", Role::User, "prompt"),
        ];

        let result = sync_context(&mut manager, &conversation).await;
        assert!(result.is_err());
        assert_eq!(manager.processed(), 0);
    }
}
