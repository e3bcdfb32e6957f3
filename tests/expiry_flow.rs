//! Auto-expiry integration tests: scheduling, cancellation paths, the
//! deferred timer, and the boot reconciliation sweep.

use std::time::Duration;

use chrono::Utc;
use ticket_desk::TicketDeskError;
use ticket_desk::core::AutoExpireEntry;
use ticket_desk::flows::{IntakeOutcome, OpenTicketRequest, ReconcileReport};
use ticket_desk::platform::events::InboundEvent;
use ticket_desk::platform::{Actor, ChannelId, RoleId, UserId};
use ticket_desk::storage::{SettingsRepository, TicketRepository};
use ticket_desk::test_utils::{TestHarness, harness};

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

#[tokio::test]
async fn schedule_persists_an_entry_and_rejects_duplicates() {
    let h = harness();
    let ticket = create_ticket(&h).await;

    let expire_at = h
        .engine
        .schedule_auto_expire(&ticket.id, &staff())
        .await
        .unwrap();
    assert!(expire_at > Utc::now() + chrono::Duration::hours(47));

    let settings = h.storage.find_or_create_settings(&h.guild).unwrap();
    let entry = settings.auto_expire_for(&ticket.channel_id).unwrap();
    assert_eq!(entry.ticket_id, ticket.id);
    assert_eq!(entry.requested_by, UserId::from("user-staff"));

    // the channel carries the expiry marker
    let name = h.platform.channel(&ticket.channel_id).unwrap().name;
    assert!(name.starts_with("⏰"));

    // scheduling twice for the same channel is rejected
    let err = h
        .engine
        .schedule_auto_expire(&ticket.id, &staff())
        .await
        .unwrap_err();
    assert!(matches!(err, TicketDeskError::State { .. }));
}

#[tokio::test]
async fn a_message_from_the_creator_cancels_the_pending_expiry() {
    let h = harness();
    let ticket = create_ticket(&h).await;
    h.engine
        .schedule_auto_expire(&ticket.id, &staff())
        .await
        .unwrap();

    // staff chatter does not cancel
    h.engine
        .note_user_message(&ticket.channel_id, &UserId::from("user-staff"))
        .await
        .unwrap();
    let settings = h.storage.find_or_create_settings(&h.guild).unwrap();
    assert!(settings.auto_expire_for(&ticket.channel_id).is_some());

    // the creator speaking up does
    h.engine
        .note_user_message(&ticket.channel_id, &UserId::from("user-opener"))
        .await
        .unwrap();
    let settings = h.storage.find_or_create_settings(&h.guild).unwrap();
    assert!(settings.auto_expire_for(&ticket.channel_id).is_none());

    let notices = h.platform.sent_to(&ticket.channel_id);
    assert!(
        notices
            .iter()
            .any(|m| m.content.contains("expiry was cancelled"))
    );
    let name = h.platform.channel(&ticket.channel_id).unwrap().name;
    assert!(!name.starts_with("⏰"));
}

#[tokio::test(start_paused = true)]
async fn the_deferred_timer_fires_and_closes_the_ticket() {
    let h = harness();
    let ticket = create_ticket(&h).await;
    h.engine
        .schedule_auto_expire(&ticket.id, &staff())
        .await
        .unwrap();

    // let the 48h timer elapse
    tokio::time::sleep(Duration::from_secs(48 * 60 * 60 + 60)).await;
    tokio::task::yield_now().await;

    let stored = h.storage.find_by_id(&ticket.id).unwrap().unwrap();
    assert!(stored.closed);
    assert_eq!(stored.closed_by, Some(UserId::from("user-staff")));
    assert!(
        stored
            .reason
            .as_deref()
            .unwrap()
            .contains("automatically expired")
    );
    assert!(h.platform.was_deleted(&ticket.channel_id));

    // the fired entry is gone
    let settings = h.storage.find_or_create_settings(&h.guild).unwrap();
    assert!(settings.auto_expire_for(&ticket.channel_id).is_none());
}

#[tokio::test(start_paused = true)]
async fn manual_close_defuses_the_scheduled_timer() {
    let h = harness();
    let ticket = create_ticket(&h).await;
    h.engine
        .schedule_auto_expire(&ticket.id, &staff())
        .await
        .unwrap();

    // ten minutes later the ticket is closed manually
    tokio::time::sleep(Duration::from_secs(600)).await;
    let engine = h.engine.clone();
    let id = ticket.id.clone();
    let close = tokio::spawn(async move { engine.close(&id, &staff()).await });

    // answer the close prompt with a free-text reason
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    loop {
        let prompted = h
            .platform
            .sent_to(&ticket.channel_id)
            .iter()
            .flat_map(|m| m.controls.clone())
            .any(|c| c.id.as_str().starts_with("@ticket-close-without-reason@"));
        if prompted {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "no close prompt");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    h.engine.events().publish(InboundEvent::Message {
        channel: ticket.channel_id.clone(),
        author: UserId::from("user-staff"),
        content: "resolved".to_string(),
    });
    close.await.unwrap().unwrap();
    assert_eq!(h.transcripts.export_count(), 1);

    // when the original timer would have fired, nothing re-closes or errors
    tokio::time::sleep(Duration::from_secs(48 * 60 * 60)).await;
    tokio::task::yield_now().await;

    let stored = h.storage.find_by_id(&ticket.id).unwrap().unwrap();
    assert_eq!(stored.reason.as_deref(), Some("resolved"));
    assert_eq!(h.transcripts.export_count(), 1);

    // a reconciliation run after the manual close takes no action either
    let report = h.engine.reconcile_auto_expiry().await.unwrap();
    assert_eq!(report, ReconcileReport::default());
}

#[tokio::test]
async fn reconciliation_force_closes_overdue_entries() {
    let h = harness();
    let ticket = create_ticket(&h).await;

    // an entry whose due time passed while the process was down
    let mut settings = h.storage.find_or_create_settings(&h.guild).unwrap();
    settings.auto_expire_tickets.push(AutoExpireEntry {
        ticket_id: ticket.id.clone(),
        channel_id: ticket.channel_id.clone(),
        expire_at: Utc::now() - chrono::Duration::hours(1),
        requested_by: UserId::from("user-staff"),
    });
    h.storage.save_settings(&settings).unwrap();

    let report = h.engine.reconcile_auto_expiry().await.unwrap();
    assert_eq!(report.force_closed, 1);
    assert_eq!(report.dropped, 0);

    let stored = h.storage.find_by_id(&ticket.id).unwrap().unwrap();
    assert!(stored.closed);
    assert!(stored.reason.as_deref().unwrap().contains("backlog"));
    assert!(h.platform.was_deleted(&ticket.channel_id));

    let settings = h.storage.find_or_create_settings(&h.guild).unwrap();
    assert!(settings.auto_expire_tickets.is_empty());
}

#[tokio::test]
async fn reconciliation_tolerates_tickets_closed_by_another_path() {
    let h = harness();
    let ticket = create_ticket(&h).await;

    // the ticket closed while the process was down, entry still present
    let mut stored = h.storage.find_by_id(&ticket.id).unwrap().unwrap();
    stored.closed = true;
    stored.closed_by = Some(UserId::from("user-staff"));
    h.storage.save(&mut stored).unwrap();

    let mut settings = h.storage.find_or_create_settings(&h.guild).unwrap();
    settings.auto_expire_tickets.push(AutoExpireEntry {
        ticket_id: ticket.id.clone(),
        channel_id: ticket.channel_id.clone(),
        expire_at: Utc::now() - chrono::Duration::hours(1),
        requested_by: UserId::from("user-staff"),
    });
    h.storage.save_settings(&settings).unwrap();

    let report = h.engine.reconcile_auto_expiry().await.unwrap();
    assert_eq!(report.force_closed, 0);
    assert_eq!(report.dropped, 1);

    // no transcript, no deletion - the sweep took no action on the ticket
    assert_eq!(h.transcripts.export_count(), 0);
    assert!(!h.platform.was_deleted(&ticket.channel_id));
    let settings = h.storage.find_or_create_settings(&h.guild).unwrap();
    assert!(settings.auto_expire_tickets.is_empty());
}

#[tokio::test]
async fn reconciliation_rearms_entries_still_in_the_future() {
    let h = harness();
    let ticket = create_ticket(&h).await;

    let mut settings = h.storage.find_or_create_settings(&h.guild).unwrap();
    settings.auto_expire_tickets.push(AutoExpireEntry {
        ticket_id: ticket.id.clone(),
        channel_id: ticket.channel_id.clone(),
        expire_at: Utc::now() + chrono::Duration::hours(12),
        requested_by: UserId::from("user-staff"),
    });
    h.storage.save_settings(&settings).unwrap();

    let report = h.engine.reconcile_auto_expiry().await.unwrap();
    assert_eq!(report.rearmed, 1);
    assert_eq!(report.force_closed, 0);

    // entry stays until the re-armed timer fires
    let settings = h.storage.find_or_create_settings(&h.guild).unwrap();
    assert!(settings.auto_expire_for(&ticket.channel_id).is_some());
    let stored = h.storage.find_by_id(&ticket.id).unwrap().unwrap();
    assert!(!stored.closed);
}
