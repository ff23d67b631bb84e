//! Shared setup for ledger integration tests

#![allow(dead_code)]

use quay_core::{Address, ChannelId, EventRecord, GroupKey, LedgerConfig};
use quay_ledger::ChannelService;
use quay_testkit::{fixtures, ManualClock};

/// A channel with a publisher, two messages and two members of one group
pub struct Fixture {
    pub service: ChannelService<ManualClock>,
    pub clock: ManualClock,
    pub channel: ChannelId,
    pub group: GroupKey,
    pub publisher: Address,
    pub a: Address,
    pub b: Address,
}

pub async fn fixture() -> Fixture {
    fixture_with(LedgerConfig::default(), 2).await
}

pub async fn fixture_with(config: LedgerConfig, messages: u64) -> Fixture {
    quay_testkit::init_test_tracing();
    let clock = ManualClock::at_secs(1_000);
    let mut service = ChannelService::new(clock.clone(), config);
    let publisher = fixtures::publisher(0);
    let (a, b) = (fixtures::subscriber(0), fixtures::subscriber(1));

    let channel = service
        .create_channel(publisher, fixtures::PUBLISHER_INDEX, fixtures::metadata())
        .await
        .unwrap()
        .output;
    for n in 0..messages {
        service
            .publish(publisher, channel, fixtures::payload(n))
            .await
            .unwrap();
    }
    let group = subscribe(&mut service, a, channel).await;
    subscribe(&mut service, b, channel).await;

    Fixture {
        service,
        clock,
        channel,
        group,
        publisher,
        a,
        b,
    }
}

pub async fn subscribe(
    service: &mut ChannelService<ManualClock>,
    who: Address,
    channel: ChannelId,
) -> GroupKey {
    service
        .subscribe(
            who,
            channel,
            fixtures::credential(0),
            fixtures::LEASE_SECS,
            fixtures::NUM_OF_RETRY,
        )
        .await
        .unwrap()
        .output
}

pub fn names(records: &[EventRecord]) -> Vec<&'static str> {
    records.iter().map(|r| r.event.name()).collect()
}
