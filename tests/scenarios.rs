//! End-to-end scenarios driven through the peer message surface with mock
//! collaborators: admission, orphan votes, the record voting window, trigger
//! rate limiting, postponement, key-rotation scrubbing, sync idempotence,
//! and snapshot round-trips.

use mn_governance::ports::{GovernanceApi, Inv, InvKind, PeerInfo, PeerMessage};
use mn_governance::testing::*;
use mn_governance::{GovernanceConfig, GovernanceManager, VoteOutcome, VoteSignal};

const CID: &str = "QmSrPmbaUKA3ZodhzPWZnpFgcPMFWF4QsxXbkWfEptTBJd";

fn masternode_cfg() -> GovernanceConfig {
    GovernanceConfig { masternode_mode: true, ..GovernanceConfig::default() }
}

fn object_inv(hash: [u8; 32]) -> Inv {
    Inv { kind: InvKind::Object, hash }
}

fn vote_inv(hash: [u8; 32]) -> Inv {
    Inv { kind: InvKind::Vote, hash }
}

/// Solicit and deliver an object the way the peer layer would.
fn deliver_object(
    mgr: &GovernanceManager,
    from: &PeerInfo,
    obj: mn_governance::GovernanceObject,
) {
    assert!(mgr.confirm_inventory_request(&object_inv(obj.hash())));
    mgr.process_message(from, PeerMessage::Object(obj));
}

fn deliver_vote(mgr: &GovernanceManager, from: &PeerInfo, vote: mn_governance::GovernanceVote) {
    assert!(mgr.confirm_inventory_request(&vote_inv(vote.hash())));
    mgr.process_message(from, PeerMessage::Vote(vote));
}

// =============================================================================
// S1: ACCEPT A VALID PROPOSAL
// =============================================================================

#[test]
fn accepts_valid_proposal_relays_pins_and_notifies() {
    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());
    let cfg = GovernanceConfig::default();

    let collateral_hash = [0xC1; 32];
    ctx.chain
        .put_collateral(collateral_hash, collateral(cfg.consensus.high_collateral, 10, 900));

    let proposal = make_proposal("net-upgrade", Some(CID), collateral_hash);
    let hash = proposal.hash();
    let from = peer(1);

    deliver_object(&mgr, &from, proposal.clone());

    assert!(mgr.find_object(&hash).is_some());
    assert!(ctx.peers.relayed().contains(&object_inv(hash)));
    assert_eq!(ctx.content.pins(), vec![format!("/ipfs/{CID}")]);
    assert_eq!(ctx.observers.objects(), vec![hash]);
    assert!(ctx.peers.penalties().is_empty());

    // The solicitation was consumed: a replayed copy is dropped without a
    // second relay or pin.
    ctx.peers.clear_recordings();
    mgr.process_message(&from, PeerMessage::Object(proposal));
    assert!(ctx.peers.relayed().is_empty());
    assert_eq!(ctx.content.pins().len(), 1);
}

#[test]
fn pin_failures_never_block_admission() {
    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());
    let cfg = GovernanceConfig::default();

    ctx.content.fail_all(true);
    let collateral_hash = [0xC2; 32];
    ctx.chain
        .put_collateral(collateral_hash, collateral(cfg.consensus.high_collateral, 10, 900));

    let proposal = make_proposal("resilient", Some(CID), collateral_hash);
    let hash = proposal.hash();
    deliver_object(&mgr, &peer(1), proposal);

    assert!(mgr.find_object(&hash).is_some());
    assert!(ctx.content.pins().is_empty());
}

#[test]
fn unrequested_objects_are_dropped() {
    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());
    let cfg = GovernanceConfig::default();

    let collateral_hash = [0xC3; 32];
    ctx.chain
        .put_collateral(collateral_hash, collateral(cfg.consensus.high_collateral, 10, 900));

    let proposal = make_proposal("uninvited", Some(CID), collateral_hash);
    let hash = proposal.hash();

    // No confirm_inventory_request first.
    mgr.process_message(&peer(1), PeerMessage::Object(proposal));
    assert!(mgr.find_object(&hash).is_none());
}

#[test]
fn invalid_objects_earn_a_ban_score() {
    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());

    // Collateral transaction exists with an amount in neither tier.
    let collateral_hash = [0xC4; 32];
    ctx.chain.put_collateral(collateral_hash, collateral(12_345, 10, 900));

    let proposal = make_proposal("bad-collateral", Some(CID), collateral_hash);
    deliver_object(&mgr, &peer(9), proposal);

    assert_eq!(ctx.peers.penalties(), vec![(9, 20)]);
}

// =============================================================================
// S2: ORPHAN VOTE, THEN PARENT ARRIVAL
// =============================================================================

#[test]
fn orphan_vote_requests_parent_and_replays_on_arrival() {
    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());
    let cfg = GovernanceConfig::default();

    let mn = masternode(5);
    ctx.directory.add_masternode(mn.clone());

    let collateral_hash = [0xC5; 32];
    ctx.chain
        .put_collateral(collateral_hash, collateral(cfg.consensus.high_collateral, 10, 900));
    let parent = make_proposal("late-parent", Some(CID), collateral_hash);
    let parent_hash = parent.hash();

    let vote = make_vote(
        parent_hash,
        mn.collateral,
        VoteSignal::Funding,
        VoteOutcome::Yes,
        TEST_EPOCH - 10,
    );
    let vote_hash = vote.hash();
    let from = peer(2);

    deliver_vote(&mgr, &from, vote);

    // Not accepted yet, no ban, and the parent was requested from the peer.
    assert!(!mgr.have_vote(&vote_hash));
    assert!(ctx.peers.penalties().is_empty());
    let requested_parent = ctx.peers.messages().iter().any(|(to, msg)| {
        *to == from.id
            && matches!(msg, PeerMessage::GovernanceSync { parent, .. } if *parent == parent_hash)
    });
    assert!(requested_parent, "expected a targeted object request");

    // Parent arrives: the orphan vote replays and relays.
    deliver_object(&mgr, &from, parent);
    assert!(mgr.find_object(&parent_hash).is_some());
    assert!(mgr.have_vote(&vote_hash));
    assert!(ctx.peers.relayed().contains(&vote_inv(vote_hash)));
}

// =============================================================================
// S3: RECORD VOTING WINDOW
// =============================================================================

#[test]
fn record_votes_past_the_funding_superblock_are_rejected() {
    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());
    let cfg = GovernanceConfig::default();

    let mn = masternode(6);
    ctx.directory.add_masternode(mn.clone());

    // Collateral mined at 900; with a 180-block cycle the funding superblock
    // is 1080. The chain is already past it.
    let superblock_time = TEST_EPOCH - 50;
    ctx.chain.set_height(1081);
    ctx.chain.set_block_time(1080, superblock_time);
    mgr.updated_block_tip(1081);

    let collateral_hash = [0xC6; 32];
    ctx.chain
        .put_collateral(collateral_hash, collateral(cfg.consensus.high_collateral, 10, 900));
    let record = make_record("archive", CID, collateral_hash);
    let record_hash = record.hash();
    let from = peer(3);
    deliver_object(&mgr, &from, record);
    assert!(mgr.find_object(&record_hash).is_some());

    // Stamped after the superblock: out of window, dropped without a ban.
    let late = make_vote(
        record_hash,
        mn.collateral,
        VoteSignal::Funding,
        VoteOutcome::Yes,
        superblock_time + 10,
    );
    let late_hash = late.hash();
    deliver_vote(&mgr, &from, late);
    assert!(!mgr.have_vote(&late_hash));
    assert!(ctx.peers.penalties().is_empty());

    // Stamped before the superblock: in window, accepted.
    let in_window = make_vote(
        record_hash,
        mn.collateral,
        VoteSignal::Funding,
        VoteOutcome::Yes,
        superblock_time - 10,
    );
    let in_window_hash = in_window.hash();
    deliver_vote(&mgr, &from, in_window);
    assert!(mgr.have_vote(&in_window_hash));
}

// =============================================================================
// S4: TRIGGER RATE LIMITING
// =============================================================================

#[test]
fn second_trigger_within_one_second_is_rate_limited() {
    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());

    let mn = masternode(7);
    ctx.directory.add_masternode(mn.clone());

    let first = make_trigger(mn.collateral, TEST_EPOCH - 10);
    let second = make_trigger(mn.collateral, TEST_EPOCH - 9);
    let from = peer(4);

    deliver_object(&mgr, &from, first.clone());
    assert!(mgr.find_object(&first.hash()).is_some());

    deliver_object(&mgr, &from, second.clone());
    assert!(mgr.find_object(&second.hash()).is_none());
    // Rate limiting is silent; no ban score.
    assert!(ctx.peers.penalties().is_empty());
}

#[test]
fn non_trigger_objects_bypass_the_rate_cap() {
    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());
    let cfg = GovernanceConfig::default();

    for (i, collateral_byte) in [(0u8, 0xD0u8), (1, 0xD1), (2, 0xD2)] {
        let collateral_hash = [collateral_byte; 32];
        ctx.chain
            .put_collateral(collateral_hash, collateral(cfg.consensus.high_collateral, 10, 900));
        let proposal = make_proposal(&format!("burst-{i}"), Some(CID), collateral_hash);
        let hash = proposal.hash();
        deliver_object(&mgr, &peer(5), proposal);
        assert!(mgr.find_object(&hash).is_some());
    }
}

// =============================================================================
// S5: MISSING CONFIRMATIONS POSTPONES
// =============================================================================

#[test]
fn immature_collateral_postpones_until_a_later_tip() {
    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());
    let cfg = GovernanceConfig::default();

    let collateral_hash = [0xC7; 32];
    ctx.chain
        .put_collateral(collateral_hash, collateral(cfg.consensus.high_collateral, 2, 900));

    let proposal = make_proposal("early-bird", Some(CID), collateral_hash);
    let hash = proposal.hash();
    deliver_object(&mgr, &peer(1), proposal);

    // Postponed: known but not accepted, pin already issued.
    assert!(mgr.have_object(&hash));
    assert!(mgr.find_object(&hash).is_none());
    assert_eq!(ctx.content.pins(), vec![format!("/ipfs/{CID}")]);
    assert!(ctx.peers.relayed().is_empty());

    // Confirmations arrive with a later tip: the object is admitted.
    ctx.chain
        .put_collateral(collateral_hash, collateral(cfg.consensus.high_collateral, 10, 900));
    mgr.updated_block_tip(1000);

    assert!(mgr.find_object(&hash).is_some());
    assert!(ctx.peers.relayed().contains(&object_inv(hash)));
}

// =============================================================================
// S6: KEY ROTATION INVALIDATES VOTES
// =============================================================================

#[test]
fn voting_key_rotation_scrubs_record_votes_before_funding() {
    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());
    let cfg = GovernanceConfig::default();

    let mn = masternode(8);
    ctx.directory.add_masternode(mn.clone());
    ctx.directory.set_deterministic(true);
    ctx.chain.set_height(1000);

    // Baseline the voting-key diff at the current list.
    mgr.updated_block_tip(1000);

    // Record whose funding superblock (1080) is still ahead of the tip.
    let collateral_hash = [0xC8; 32];
    ctx.chain
        .put_collateral(collateral_hash, collateral(cfg.consensus.high_collateral, 10, 900));
    let record = make_record("rotating", CID, collateral_hash);
    let record_hash = record.hash();
    let from = peer(6);
    deliver_object(&mgr, &from, record);

    let vote = make_vote(
        record_hash,
        mn.collateral,
        VoteSignal::Funding,
        VoteOutcome::Yes,
        TEST_EPOCH - 10,
    );
    let vote_hash = vote.hash();
    deliver_vote(&mgr, &from, vote);
    assert!(mgr.have_vote(&vote_hash));

    // The masternode rotates its voting key.
    let mut rotated = mn.clone();
    rotated.voting_key = [0xEE; 32];
    ctx.directory.set_list(mn_governance::ports::outbound::MasternodeList {
        height: 1001,
        masternodes: vec![rotated],
    });
    mgr.updated_block_tip(1001);

    assert!(!mgr.have_vote(&vote_hash));
    assert!(mgr.get_current_votes(&record_hash, Some(mn.collateral)).is_empty());
}

// =============================================================================
// SYNC IDEMPOTENCE
// =============================================================================

#[test]
fn second_full_sync_serves_nothing_and_penalizes() {
    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());
    let cfg = GovernanceConfig::default();

    let collateral_hash = [0xC9; 32];
    ctx.chain
        .put_collateral(collateral_hash, collateral(cfg.consensus.high_collateral, 10, 900));
    let proposal = make_proposal("syncable", Some(CID), collateral_hash);
    let hash = proposal.hash();
    deliver_object(&mgr, &peer(1), proposal);

    let asker = peer(7);
    ctx.peers.clear_recordings();
    mgr.process_message(
        &asker,
        PeerMessage::GovernanceSync { parent: [0u8; 32], filter: None },
    );

    let first_invs = ctx.peers.inventories();
    assert!(first_invs.contains(&(asker.id, object_inv(hash))));
    let sent_marker = ctx.peers.messages().iter().any(|(to, msg)| {
        *to == asker.id
            && matches!(
                msg,
                PeerMessage::SyncStatusCount { kind: InvKind::Object, count: 1 }
            )
    });
    assert!(sent_marker);

    // A repeat ask serves nothing and earns a ban score.
    ctx.peers.clear_recordings();
    mgr.process_message(
        &asker,
        PeerMessage::GovernanceSync { parent: [0u8; 32], filter: None },
    );
    assert!(ctx.peers.inventories().is_empty());
    assert_eq!(ctx.peers.penalties(), vec![(asker.id, 20)]);
}

#[test]
fn single_object_sync_skips_votes_the_filter_already_has() {
    use mn_governance::domain::bloom::VoteFilter;

    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());
    let cfg = GovernanceConfig::default();

    let mn_a = masternode(11);
    let mn_b = masternode(12);
    ctx.directory.add_masternode(mn_a.clone());
    ctx.directory.add_masternode(mn_b.clone());

    let collateral_hash = [0xCA; 32];
    ctx.chain
        .put_collateral(collateral_hash, collateral(cfg.consensus.high_collateral, 10, 900));
    let proposal = make_proposal("voted", Some(CID), collateral_hash);
    let hash = proposal.hash();
    let from = peer(1);
    deliver_object(&mgr, &from, proposal);

    let vote_a = make_vote(hash, mn_a.collateral, VoteSignal::Funding, VoteOutcome::Yes, TEST_EPOCH - 20);
    let vote_b = make_vote(hash, mn_b.collateral, VoteSignal::Funding, VoteOutcome::No, TEST_EPOCH - 20);
    deliver_vote(&mgr, &from, vote_a.clone());
    deliver_vote(&mgr, &from, vote_b.clone());

    // The peer already holds vote A.
    let mut filter = VoteFilter::with_fpr(64, 0.001, 1);
    filter.insert(&vote_a.hash());

    let asker = peer(8);
    ctx.peers.clear_recordings();
    mgr.process_message(
        &asker,
        PeerMessage::GovernanceSync { parent: hash, filter: Some(filter) },
    );

    let invs = ctx.peers.inventories();
    assert!(!invs.contains(&(asker.id, vote_inv(vote_a.hash()))));
    assert!(invs.contains(&(asker.id, vote_inv(vote_b.hash()))));
}

// =============================================================================
// MAINTENANCE: DELETE MAJORITY EVICTION
// =============================================================================

#[test]
fn delete_majority_evicts_record_and_unpins_after_the_delay() {
    let ctx = TestContext::new();
    let cfg = masternode_cfg();
    let deletion_delay = cfg.deletion_delay_secs;
    let mgr = ctx.manager(cfg);
    let params = GovernanceConfig::default();

    // Ten masternodes so the delete majority threshold is > 1.
    let voters: Vec<_> = (20u8..30).map(masternode).collect();
    for mn in &voters {
        ctx.directory.add_masternode(mn.clone());
    }

    let collateral_hash = [0xCB; 32];
    ctx.chain
        .put_collateral(collateral_hash, collateral(params.consensus.high_collateral, 10, 900));
    let record = make_record("doomed", CID, collateral_hash);
    let hash = record.hash();
    let from = peer(1);
    deliver_object(&mgr, &from, record);

    for mn in voters.iter().take(3) {
        let vote = make_vote(hash, mn.collateral, VoteSignal::Delete, VoteOutcome::Yes, TEST_EPOCH - 10);
        deliver_vote(&mgr, &from, vote);
    }

    // First sweep recomputes sentinels and flags the record for deletion.
    mgr.do_maintenance();
    assert!(mgr.find_object(&hash).is_some());

    // Past the delay the record is purged and its content unpinned.
    ctx.clock.advance(deletion_delay + 1);
    mgr.do_maintenance();
    assert!(mgr.find_object(&hash).is_none());
    assert_eq!(ctx.content.unpins(), vec![format!("/ipfs/{CID}")]);

    // The erased hash blocks re-introduction.
    assert!(!mgr.confirm_inventory_request(&object_inv(hash)) || {
        // Even if the inventory is re-confirmed, delivery is rejected as seen.
        let record = make_record("doomed", CID, collateral_hash);
        mgr.process_message(&from, PeerMessage::Object(record));
        mgr.find_object(&hash).is_none()
    });
}

// =============================================================================
// SNAPSHOT ROUND-TRIP
// =============================================================================

#[test]
fn snapshot_round_trip_restores_objects_votes_and_indices() {
    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());
    let cfg = GovernanceConfig::default();

    let mn = masternode(9);
    ctx.directory.add_masternode(mn.clone());

    let collateral_hash = [0xCC; 32];
    ctx.chain
        .put_collateral(collateral_hash, collateral(cfg.consensus.high_collateral, 10, 900));
    let proposal = make_proposal("durable", Some(CID), collateral_hash);
    let hash = proposal.hash();
    let from = peer(1);
    deliver_object(&mgr, &from, proposal);

    let vote = make_vote(hash, mn.collateral, VoteSignal::Funding, VoteOutcome::Yes, TEST_EPOCH - 10);
    let vote_hash = vote.hash();
    deliver_vote(&mgr, &from, vote);

    let bytes = mgr.save_snapshot().unwrap();

    // A fresh node restores the snapshot and rebuilds its indices.
    let restored_ctx = TestContext::new();
    let restored = restored_ctx.manager(masternode_cfg());
    restored.load_snapshot(&bytes).unwrap();

    assert!(restored.find_object(&hash).is_some());
    assert!(restored.have_vote(&vote_hash));
    assert_eq!(restored.vote_count(), 1);
    assert_eq!(restored.summary(), mgr.summary());

    // A corrupt snapshot aborts the load.
    assert!(restored.load_snapshot(b"garbage").is_err());
}

#[test]
fn rejected_triggers_come_back_flagged_for_deletion() {
    let ctx = TestContext::new();
    let mgr = ctx.manager(masternode_cfg());

    let mn = masternode(10);
    ctx.directory.add_masternode(mn.clone());

    let trigger = make_trigger(mn.collateral, TEST_EPOCH - 10);
    let hash = trigger.hash();
    deliver_object(&mgr, &peer(1), trigger);
    assert!(mgr.find_object(&hash).is_some());

    let bytes = mgr.save_snapshot().unwrap();

    let restored_ctx = TestContext::new();
    restored_ctx.directory.add_masternode(mn);
    restored_ctx.triggers.set_accept(false);
    let restored = restored_ctx.manager(masternode_cfg());
    restored.load_snapshot(&bytes).unwrap();

    let obj = restored.find_object(&hash).unwrap();
    assert!(obj.flags.cached_delete);
}
