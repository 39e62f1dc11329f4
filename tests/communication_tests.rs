//! Chat mediation and ratings once a request has been resolved
mod common;

use anyhow::Context;
use common::Harness;
use freight_market::MarketError;
use freight_market::model::{Request, RequestStatus};
use freight_market::notify::NotificationKind;
use freight_market::types::UserProfile;
use rust_decimal::Decimal;

/// Client, accepted transporter and a resolved request between them.
fn resolved(h: &Harness) -> anyhow::Result<(UserProfile, UserProfile, Request)> {
    let client = h.client("Ana")?;
    let carrier = h.transporter("Luis")?;
    let request = h.post_request(&client, "Valencia a Madrid")?;
    let offer = h.bid(&request, &carrier, 250_00)?;
    h.market.resolution().accept_offer(&offer.id, &client.id)?;
    Ok((client, carrier, request))
}

/// Run a negotiation between `client` and `carrier` through to completion.
fn completed(h: &Harness, client: &UserProfile, carrier: &UserProfile) -> anyhow::Result<Request> {
    let request = h.post_request(client, "Castellón a Teruel")?;
    let offer = h.bid(&request, carrier, 180_00)?;
    h.market.resolution().accept_offer(&offer.id, &client.id)?;
    Ok(h.market
        .negotiation()
        .update_request_status(&request.id, &carrier.id, RequestStatus::Completed)?)
}

#[test]
fn client_cannot_chat_before_acceptance() -> anyhow::Result<()> {
    let h = Harness::new("chat_before_acceptance")?;
    let client = h.client("Ana")?;
    let carrier = h.transporter("Luis")?;
    let request = h.post_request(&client, "Valencia a Madrid")?;
    h.bid(&request, &carrier, 250_00)?;

    let err = h
        .market
        .chat()
        .send_message(&request.id, &client.id, "¿Cuándo puedes cargar?")
        .unwrap_err();
    assert!(matches!(err, MarketError::InvalidState(_)), "got {err:?}");

    Ok(())
}

#[test]
fn messages_are_filtered_routed_and_marked_read() -> anyhow::Result<()> {
    let h = Harness::new("chat_routing")?;
    let (client, carrier, request) = resolved(&h)?;
    let chat = h.market.chat();

    let sent = chat
        .send_message(&request.id, &client.id, "Llámame al 612 345 678 mañana")
        .context("Client message failed: ")?;
    assert_eq!(sent.message.receiver_id, carrier.id);
    assert_eq!(sent.message.content, "Llámame al [teléfono oculto] mañana");
    assert!(sent.message.redacted);
    assert!(sent.warning.is_some());

    let reply = chat.send_message(&request.id, &carrier.id, "Perfecto, a las 8")?;
    assert_eq!(reply.message.receiver_id, client.id);
    assert!(!reply.message.redacted);
    assert!(reply.warning.is_none());

    assert!(matches!(
        chat.send_message(&request.id, &carrier.id, "   "),
        Err(MarketError::InvalidArgument(_))
    ));

    // the receiver gets a preview of the filtered text only
    let notes = h.outbox.for_recipient(&carrier.id)?;
    let message_note = notes
        .iter()
        .find(|n| n.kind == NotificationKind::NewMessage)
        .context("no message notification")?;
    assert!(!message_note.body.contains("612"));

    assert_eq!(chat.unread_count(&carrier.id)?, 1);
    let thread = chat.list_messages(&request.id, &carrier.id)?;
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[0].id, sent.message.id);
    assert!(thread[0].read);
    assert!(!thread[1].read);
    assert_eq!(chat.unread_count(&carrier.id)?, 0);
    assert_eq!(chat.unread_count(&client.id)?, 1);

    Ok(())
}

#[test]
fn conversations_are_private_and_auditable() -> anyhow::Result<()> {
    let h = Harness::new("chat_audit")?;
    let (client, carrier, request) = resolved(&h)?;
    let outsider = h.transporter("Otro")?;
    let admin = h.admin("Soporte")?;

    let original = "mi correo es luis@transportes.es";
    h.market.chat().send_message(&request.id, &carrier.id, original)?;

    assert!(matches!(
        h.market.chat().list_messages(&request.id, &outsider.id),
        Err(MarketError::Forbidden(_))
    ));
    assert!(matches!(
        h.market.chat().audit_messages(&request.id, &client.id),
        Err(MarketError::Forbidden(_))
    ));

    let audit = h.market.chat().audit_messages(&request.id, &admin.id)?;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].original_content.as_deref(), Some(original));
    assert_eq!(audit[0].content, "mi correo es [email oculto]");
    assert_eq!(audit[0].redaction_reason.as_deref(), Some("correo electrónico"));

    Ok(())
}

#[test]
fn only_the_accepted_parties_may_write() -> anyhow::Result<()> {
    let h = Harness::new("chat_participants")?;
    let client = h.client("Ana")?;
    let carrier = h.transporter("Luis")?;
    let loser = h.transporter("Pedro")?;
    let request = h.post_request(&client, "Valencia a Madrid")?;
    let won = h.bid(&request, &carrier, 250_00)?;
    h.bid(&request, &loser, 240_00)?;

    // before acceptance a bidder has no conversation to write into either
    assert!(matches!(
        h.market.chat().send_message(&request.id, &loser.id, "¿Sigue disponible?"),
        Err(MarketError::Forbidden(_))
    ));

    h.market.resolution().accept_offer(&won.id, &client.id)?;
    let chat = h.market.chat();

    for intruder in [loser.id.as_str(), "user_unknown"] {
        let err = chat
            .send_message(&request.id, intruder, "hola")
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)), "got {err:?}");
    }

    chat.send_message(&request.id, &carrier.id, "Cargo el lunes")?;
    let thread = chat.list_messages(&request.id, &client.id)?;
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].sender_id, carrier.id);

    Ok(())
}

#[test]
fn one_rating_per_rater_and_request() -> anyhow::Result<()> {
    let h = Harness::new("rating_once")?;
    let client = h.client("Ana")?;
    let carrier = h.transporter("Luis")?;
    let request = completed(&h, &client, &carrier)?;
    let ratings = h.market.ratings();

    let rating =
        ratings.submit_rating(&client.id, &carrier.id, &request.id, 5, Some(" Puntual ".into()))?;
    assert_eq!(rating.comment.as_deref(), Some("Puntual"));

    let err = ratings
        .submit_rating(&client.id, &carrier.id, &request.id, 4, None)
        .unwrap_err();
    assert!(matches!(err, MarketError::Conflict(_)), "got {err:?}");

    // the duplicate check comes before score validation
    let err = ratings
        .submit_rating(&client.id, &carrier.id, &request.id, 9, None)
        .unwrap_err();
    assert!(matches!(err, MarketError::Conflict(_)), "got {err:?}");

    for score in [0, 6] {
        assert!(matches!(
            ratings.submit_rating(&carrier.id, &client.id, &request.id, score, None),
            Err(MarketError::InvalidArgument(_))
        ));
    }
    // the failed attempts claimed nothing
    ratings.submit_rating(&carrier.id, &client.id, &request.id, 4, None)?;

    let notes = h.outbox.for_recipient(&carrier.id)?;
    assert_eq!(notes[0].kind, NotificationKind::NewRating);

    Ok(())
}

#[test]
fn ratings_belong_to_a_completed_negotiation() -> anyhow::Result<()> {
    let h = Harness::new("rating_scope")?;
    let (client, carrier, request) = resolved(&h)?;
    let outsider = h.client("Berta")?;
    let ratings = h.market.ratings();

    assert!(matches!(
        ratings.submit_rating(&client.id, &carrier.id, "req_made_up", 1, None),
        Err(MarketError::NotFound(_))
    ));

    // accepted but not delivered yet
    assert!(matches!(
        ratings.submit_rating(&client.id, &carrier.id, &request.id, 5, None),
        Err(MarketError::InvalidState(_))
    ));

    h.market
        .negotiation()
        .update_request_status(&request.id, &carrier.id, RequestStatus::Completed)?;

    for (rater, ratee) in [
        (&outsider.id, &carrier.id),
        (&client.id, &outsider.id),
        (&client.id, &client.id),
        (&carrier.id, &carrier.id),
    ] {
        let err = ratings
            .submit_rating(rater, ratee, &request.id, 1, None)
            .unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)), "got {err:?}");
    }
    assert_eq!(ratings.reputation(&carrier.id)?.count, 0);

    // a request nobody won has no pair to rate
    let unanswered = h.post_request(&client, "Sin ofertas")?;
    h.market
        .negotiation()
        .update_request_status(&unanswered.id, &client.id, RequestStatus::Completed)?;
    assert!(matches!(
        ratings.submit_rating(&client.id, &carrier.id, &unanswered.id, 5, None),
        Err(MarketError::InvalidState(_))
    ));

    Ok(())
}

#[test]
fn reputation_tracks_the_rounded_mean() -> anyhow::Result<()> {
    let h = Harness::new("reputation")?;
    let carrier = h.transporter("Luis")?;
    let ratings = h.market.ratings();

    assert_eq!(ratings.reputation(&carrier.id)?.count, 0);

    for (name, score) in [("Ana", 5), ("Berta", 4), ("Carla", 4)] {
        let client = h.client(name)?;
        let request = completed(&h, &client, &carrier)?;
        ratings.submit_rating(&client.id, &carrier.id, &request.id, score, None)?;
    }

    let reputation = ratings.reputation(&carrier.id)?;
    assert_eq!(reputation.count, 3);
    assert_eq!(reputation.average, Decimal::new(433, 2));
    assert_eq!(ratings.ratings_for(&carrier.id)?.len(), 3);

    // a full rebuild lands on the same figures
    assert_eq!(ratings.reconcile_all()?, 1);
    assert_eq!(ratings.reputation(&carrier.id)?, reputation);

    Ok(())
}
