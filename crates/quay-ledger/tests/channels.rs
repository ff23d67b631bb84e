//! Channel creation, membership and publishing

mod common;

use assert_matches::assert_matches;
use common::{fixture, names, subscribe};
use quay_core::{ChannelId, GroupKey, LedgerConfig, MessageId, PublisherIndex, QuayError};
use quay_ledger::{ChannelService, CHANNEL_NOT_FOUND, ONLY_PUBLISHERS, ONLY_SUBSCRIBERS};
use quay_testkit::fixtures::{self, MAX_SCAN, PUBLISHER_INDEX};
use quay_testkit::ManualClock;

fn service() -> ChannelService<ManualClock> {
    ChannelService::new(ManualClock::at_secs(0), LedgerConfig::default())
}

#[tokio::test]
async fn channel_ids_are_sequential() {
    let mut service = service();
    let creator = fixtures::publisher(0);

    for expected in 0..3 {
        let receipt = service
            .create_channel(creator, PUBLISHER_INDEX, fixtures::metadata())
            .await
            .unwrap();
        assert_eq!(receipt.output, ChannelId(expected));
        assert_eq!(names(&receipt.events), vec!["ChannelCreated"]);
    }
    assert_eq!(service.channel_count(), 3);
    assert_eq!(service.channel_metadata(ChannelId(1)).unwrap(), b"metadata");
    assert!(service.is_publisher(ChannelId(2), &creator));
}

#[tokio::test]
async fn message_ids_follow_message_count() {
    let mut service = service();
    let p = fixtures::publisher(0);
    let channel = service
        .create_channel(p, PUBLISHER_INDEX, Vec::new())
        .await
        .unwrap()
        .output;

    for k in 0..5 {
        assert_eq!(service.message_count(channel).unwrap(), k);
        let id = service
            .publish(p, channel, fixtures::payload(k))
            .await
            .unwrap()
            .output;
        assert_eq!(id, MessageId(k));
    }
    let message = service.get_message(&p, channel, MessageId(3)).unwrap();
    assert_eq!(message.payload, fixtures::payload(3));
    assert_eq!(message.publisher, p);
}

#[tokio::test]
async fn only_publishers_may_publish() {
    let mut service = service();
    let owner = fixtures::publisher(0);
    let other = fixtures::publisher(1);
    let channel = service
        .create_channel(owner, PUBLISHER_INDEX, Vec::new())
        .await
        .unwrap()
        .output;

    assert_eq!(
        service.publish(other, channel, b"x".to_vec()).await,
        Err(QuayError::unauthorized(ONLY_PUBLISHERS))
    );
    assert_eq!(service.message_count(channel).unwrap(), 0);

    let joined = service.join(other, channel, PublisherIndex(3)).await.unwrap();
    assert_eq!(names(&joined.events), vec!["PublisherJoined"]);
    assert!(service.is_publisher(channel, &other));
    service.publish(other, channel, b"x".to_vec()).await.unwrap();
}

#[tokio::test]
async fn unknown_channel_is_not_found() {
    let mut service = service();
    let who = fixtures::publisher(0);
    let missing = ChannelId(42);
    let not_found = QuayError::not_found(CHANNEL_NOT_FOUND);

    assert_eq!(service.join(who, missing, PUBLISHER_INDEX).await, Err(not_found.clone()));
    assert_eq!(
        service.publish(who, missing, Vec::new()).await,
        Err(not_found.clone())
    );
    assert_eq!(
        service
            .subscribe(who, missing, fixtures::credential(0), 2, 2)
            .await,
        Err(not_found.clone())
    );
    assert_eq!(
        service.get_next(who, missing, MAX_SCAN).await,
        Err(not_found.clone())
    );
    assert_eq!(service.channel_metadata(missing), Err(not_found));
    assert!(service.events().is_empty());
}

#[tokio::test]
async fn consumer_operations_require_membership() {
    let mut f = fixture().await;
    let outsider = fixtures::outsider();
    let unauthorized = QuayError::unauthorized(ONLY_SUBSCRIBERS);

    assert_eq!(
        f.service.get_next(outsider, f.channel, MAX_SCAN).await,
        Err(unauthorized.clone())
    );
    assert_eq!(
        f.service.confirm(outsider, f.channel, MessageId(0)).await,
        Err(unauthorized.clone())
    );
    assert_eq!(
        f.service.skip(outsider, f.channel, MessageId(0)).await,
        Err(unauthorized)
    );
    assert_matches!(
        f.service.get_message(&outsider, f.channel, MessageId(0)),
        Err(QuayError::Unauthorized { .. })
    );
    assert!(f.service.get_message(&f.a, f.channel, MessageId(0)).is_ok());
    assert_matches!(
        f.service.get_message(&f.a, f.channel, MessageId(9)),
        Err(QuayError::NotFound { .. })
    );
}

#[tokio::test]
async fn subscribe_derives_group_and_records_membership() {
    let mut f = fixture().await;

    assert!(f.service.is_subscriber(f.channel, &f.a));
    assert!(!f.service.is_subscriber(f.channel, &f.publisher));
    assert_eq!(f.service.group_of(f.channel, &f.b), Some(f.group));
    assert_eq!(
        f.group,
        GroupKey::derive(f.channel, &fixtures::credential(0))
    );

    let view = f.service.group_view(f.channel, &f.group).unwrap();
    assert_eq!(view.member_count, 2);
    assert_eq!(view.config.lease_duration_secs, fixtures::LEASE_SECS);
    assert_eq!(view.config.num_of_retry, fixtures::NUM_OF_RETRY);
    assert!(view.lease.is_none());
}

#[tokio::test]
async fn resubscribing_is_idempotent() {
    let mut f = fixture().await;
    let again = subscribe(&mut f.service, f.a, f.channel).await;
    assert_eq!(again, f.group);
    assert_eq!(f.service.group_view(f.channel, &f.group).unwrap().member_count, 2);
}

#[tokio::test]
async fn subscriber_cannot_switch_groups() {
    let mut f = fixture().await;
    let before = f.service.snapshot();

    assert_matches!(
        f.service
            .subscribe(f.a, f.channel, fixtures::credential(5), 2, 2)
            .await,
        Err(QuayError::InvalidState { .. })
    );
    assert_eq!(f.service.snapshot(), before);
}

#[tokio::test]
async fn group_settings_are_fixed_at_creation() {
    let mut f = fixture().await;
    let late = fixtures::subscriber(9);

    let key = f
        .service
        .subscribe(late, f.channel, fixtures::credential(0), 600, 9)
        .await
        .unwrap()
        .output;
    assert_eq!(key, f.group);

    let view = f.service.group_view(f.channel, &f.group).unwrap();
    assert_eq!(view.config.lease_duration_secs, fixtures::LEASE_SECS);
    assert_eq!(view.config.num_of_retry, fixtures::NUM_OF_RETRY);
}

#[tokio::test]
async fn lease_duration_is_validated_on_group_creation() {
    let mut f = fixture().await;
    let newcomer = fixtures::subscriber(4);
    let limit = f.service.config().max_lease_duration_secs;

    for secs in [0, limit + 1] {
        assert_matches!(
            f.service
                .subscribe(newcomer, f.channel, fixtures::credential(3), secs, 1)
                .await,
            Err(QuayError::Invalid { .. })
        );
    }
    assert!(!f.service.is_subscriber(f.channel, &newcomer));
    let key = GroupKey::derive(f.channel, &fixtures::credential(3));
    assert_matches!(
        f.service.group_view(f.channel, &key),
        Err(QuayError::NotFound { .. })
    );
}
