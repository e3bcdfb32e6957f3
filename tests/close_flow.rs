//! Close and request-close integration tests: one winning outcome per
//! prompt, exactly-once closing, and partial-failure reporting.

use std::time::Duration;

use ticket_desk::TicketDeskError;
use ticket_desk::flows::{CloseOutcome, IntakeOutcome, OpenTicketRequest, RequestCloseOutcome};
use ticket_desk::platform::events::InboundEvent;
use ticket_desk::platform::{Actor, ChannelId, ControlId, RoleId, UserId};
use ticket_desk::storage::TicketRepository;
use ticket_desk::test_utils::{RecordingPlatform, TestHarness, harness};

fn opener() -> Actor {
    Actor::new("user-opener", "Mira Saki")
}

fn staff() -> Actor {
    Actor::new("user-staff", "Helper").with_roles(vec![RoleId::from("role-staff")])
}

async fn create_ticket(h: &TestHarness) -> ticket_desk::core::Ticket {
    let outcome = h
        .engine
        .open_ticket(OpenTicketRequest {
            guild_id: h.guild.clone(),
            panel_index: 0,
            action_index: 0,
            server_identifier: None,
            actor: opener(),
            invoked_in: ChannelId::from("entry-1"),
        })
        .await
        .unwrap();
    match outcome {
        IntakeOutcome::Created(created) => created.ticket,
        IntakeOutcome::AwaitingServerSelection => panic!("unexpected server selection"),
    }
}

/// Wait until a control with the given id prefix shows up in the channel
async fn wait_for_control(
    platform: &RecordingPlatform,
    channel: &ChannelId,
    prefix: &str,
) -> ControlId {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        let found = platform
            .sent_to(channel)
            .iter()
            .flat_map(|m| m.controls.clone())
            .find(|c| c.id.as_str().starts_with(prefix));
        if let Some(control) = found {
            return control.id;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "no `{prefix}` control appeared in {channel}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn click(channel: &ChannelId, user: &str, control: ControlId) -> InboundEvent {
    InboundEvent::ComponentClick {
        channel: channel.clone(),
        user: UserId::from(user),
        control,
    }
}

#[tokio::test]
async fn close_with_text_reason_runs_the_full_terminal_sequence() {
    let h = harness();
    let ticket = create_ticket(&h).await;

    let engine = h.engine.clone();
    let id = ticket.id.clone();
    let close = tokio::spawn(async move { engine.close(&id, &staff()).await });

    wait_for_control(&h.platform, &ticket.channel_id, "@ticket-close-without-reason@").await;
    h.engine.events().publish(InboundEvent::Message {
        channel: ticket.channel_id.clone(),
        author: UserId::from("user-staff"),
        content: "resolved via compensation".to_string(),
    });

    let CloseOutcome::Closed(report) = close.await.unwrap().unwrap() else {
        panic!("expected a close");
    };
    assert_eq!(report.reason.as_deref(), Some("resolved via compensation"));
    assert!(report.transcript_attached);
    assert!(report.channel_deleted);

    let stored = h.storage.find_by_id(&ticket.id).unwrap().unwrap();
    assert!(stored.closed);
    assert_eq!(stored.closed_by, Some(UserId::from("user-staff")));
    assert_eq!(stored.reason.as_deref(), Some("resolved via compensation"));

    // the creator gets the transcript by DM
    let dms = h.platform.dms_to(&UserId::from("user-opener"));
    assert_eq!(dms.len(), 1);
    assert_eq!(dms[0].attachments.len(), 1);

    // channel deletion is the terminal signal
    assert!(h.platform.was_deleted(&ticket.channel_id));
    assert_eq!(h.transcripts.export_count(), 1);

    // the log record carries the reason and the transcript
    let log = h.platform.sent_to(&ChannelId::from("log-1"));
    let close_record = log.last().unwrap();
    assert!(close_record.content.contains("closed a ticket"));
    assert!(
        close_record.sections[0]
            .fields
            .iter()
            .any(|f| f.value == "resolved via compensation")
    );
}

#[tokio::test]
async fn close_is_idempotent_and_never_regenerates_a_transcript() {
    let h = harness();
    let ticket = create_ticket(&h).await;

    let engine = h.engine.clone();
    let id = ticket.id.clone();
    let close = tokio::spawn(async move { engine.close(&id, &staff()).await });
    let confirm =
        wait_for_control(&h.platform, &ticket.channel_id, "@ticket-close-without-reason@").await;
    h.engine
        .events()
        .publish(click(&ticket.channel_id, "user-staff", confirm));
    let CloseOutcome::Closed(report) = close.await.unwrap().unwrap() else {
        panic!("expected a close");
    };
    assert!(report.reason.is_none());

    // a second close is rejected before any prompt or transcript
    let err = h.engine.close(&ticket.id, &staff()).await.unwrap_err();
    assert!(matches!(err, TicketDeskError::State { .. }));
    assert_eq!(h.transcripts.export_count(), 1);

    // and no further lifecycle transition applies to a closed ticket
    let err = h.engine.claim(&ticket.id, &staff()).await.unwrap_err();
    assert!(matches!(err, TicketDeskError::State { .. }));
}

#[tokio::test]
async fn cancelling_the_close_prompt_leaves_the_ticket_open() {
    let h = harness();
    let ticket = create_ticket(&h).await;

    let engine = h.engine.clone();
    let id = ticket.id.clone();
    let close = tokio::spawn(async move { engine.close(&id, &staff()).await });
    let cancel = wait_for_control(&h.platform, &ticket.channel_id, "@ticket-close-cancel@").await;
    h.engine
        .events()
        .publish(click(&ticket.channel_id, "user-staff", cancel));

    assert!(matches!(
        close.await.unwrap().unwrap(),
        CloseOutcome::Cancelled
    ));
    let stored = h.storage.find_by_id(&ticket.id).unwrap().unwrap();
    assert!(!stored.closed);
    assert_eq!(h.transcripts.export_count(), 0);
}

#[tokio::test]
async fn failed_channel_deletion_is_reported_but_not_fatal() {
    let h = harness();
    let ticket = create_ticket(&h).await;
    h.platform.fail_deletes(true);

    let engine = h.engine.clone();
    let id = ticket.id.clone();
    let close = tokio::spawn(async move { engine.close(&id, &staff()).await });
    let confirm =
        wait_for_control(&h.platform, &ticket.channel_id, "@ticket-close-without-reason@").await;
    h.engine
        .events()
        .publish(click(&ticket.channel_id, "user-staff", confirm));

    let CloseOutcome::Closed(report) = close.await.unwrap().unwrap() else {
        panic!("expected a close");
    };
    assert!(!report.channel_deleted);

    // the record is closed even though the channel lingers
    let stored = h.storage.find_by_id(&ticket.id).unwrap().unwrap();
    assert!(stored.closed);
    assert!(!h.platform.was_deleted(&ticket.channel_id));
}

#[tokio::test]
async fn request_close_proceeds_once_the_creator_accepts() {
    let h = harness();
    let ticket = create_ticket(&h).await;

    let engine = h.engine.clone();
    let id = ticket.id.clone();
    let request = tokio::spawn(async move { engine.request_close(&id, &staff()).await });

    // stage one: the staff member settles on "without reason"
    let confirm = wait_for_control(
        &h.platform,
        &ticket.channel_id,
        "@ticket-request-close-without-reason@",
    )
    .await;
    h.engine
        .events()
        .publish(click(&ticket.channel_id, "user-staff", confirm));

    // stage two: the creator accepts
    let accept = wait_for_control(
        &h.platform,
        &ticket.channel_id,
        "@ticket-request-close-accept@",
    )
    .await;
    h.engine
        .events()
        .publish(click(&ticket.channel_id, "user-opener", accept));

    let RequestCloseOutcome::Closed(report) = request.await.unwrap().unwrap() else {
        panic!("expected a close");
    };
    assert_eq!(report.closed_by, UserId::from("user-staff"));
    assert!(h.platform.was_deleted(&ticket.channel_id));

    let log = h.platform.sent_to(&ChannelId::from("log-1"));
    assert!(log.last().unwrap().content.contains("request-closed"));
}

#[tokio::test]
async fn request_close_declined_by_the_creator_is_cancelled() {
    let h = harness();
    let ticket = create_ticket(&h).await;

    let engine = h.engine.clone();
    let id = ticket.id.clone();
    let request = tokio::spawn(async move { engine.request_close(&id, &staff()).await });

    let confirm = wait_for_control(
        &h.platform,
        &ticket.channel_id,
        "@ticket-request-close-without-reason@",
    )
    .await;
    h.engine
        .events()
        .publish(click(&ticket.channel_id, "user-staff", confirm));

    let decline = wait_for_control(
        &h.platform,
        &ticket.channel_id,
        "@ticket-request-close-decline@",
    )
    .await;
    h.engine
        .events()
        .publish(click(&ticket.channel_id, "user-opener", decline));

    assert!(matches!(
        request.await.unwrap().unwrap(),
        RequestCloseOutcome::Declined
    ));

    // ticket stays open, the proposing staff member is notified
    let stored = h.storage.find_by_id(&ticket.id).unwrap().unwrap();
    assert!(!stored.closed);
    let notices = h.platform.sent_to(&ticket.channel_id);
    assert!(notices.iter().any(|m| m.content.contains("declined")));
    assert_eq!(h.transcripts.export_count(), 0);
}
