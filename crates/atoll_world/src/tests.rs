//! Scenario tests driving the world through whole client lifecycles:
//! join, watch, move, mutate, and leave, asserting on the frames that
//! reach each client.

use crate::batch::ClientNotice;
use crate::client::ClientFrame;
use crate::config::{TeleportPolicy, WorldConfig};
use crate::controller::PatrolController;
use crate::entity::EntityKind;
use crate::error::KickReason;
use crate::map::WorldMap;
use crate::movement::{MovementOutcome, MovementPacket};
use crate::subscription::desired_regions;
use crate::types::{ClientId, DirtyFlags, EntityState, MapId, Rect, RegionHandle, Tile, Vec2};
use crate::world::World;

/// A 32x32 all-grass map: a 4x4 region grid with nothing to collide with.
fn flat_world() -> World {
    flat_world_with(WorldConfig::default())
}

fn flat_world_with(config: WorldConfig) -> World {
    let mut world = World::with_maps(
        config,
        vec![WorldMap::new(MapId(0), "flat", 32, 32, Tile::Grass)],
    );
    world.initialize(0);
    world
}

fn frame_for<'a>(frames: &'a [ClientFrame], client: ClientId) -> Option<&'a ClientFrame> {
    frames.iter().find(|f| f.client == client)
}

fn join(world: &mut World, name: &str) -> ClientId {
    let id = ClientId::new();
    world.add_client(id, name).unwrap();
    id
}

fn report(x: f32, y: f32, client_time_ms: u64) -> MovementPacket {
    MovementPacket {
        x,
        y,
        vx: 0.0,
        vy: 0.0,
        state: EntityState::NONE,
        client_time_ms,
    }
}

#[test]
fn one_tick_of_churn_collapses_to_one_update_record() {
    let mut world = flat_world();
    let watcher = join(&mut world, "watcher");
    let mover = join(&mut world, "mover");
    world.update(0.05, 50);
    // Second tick flushes the join adds, so the churn below arrives as
    // plain updates instead of folding into a pending add.
    world.update(0.05, 100);

    let pawn = world.client(mover).unwrap().entity;

    // Several operations against the same entity within one tick.
    world
        .handle_movement(mover, &report(17.0, 16.0, 100), 150)
        .unwrap();
    world.set_entity_expression(pawn, Some(2), true).unwrap();
    world.play_entity_action(pawn, 7).unwrap();

    let frames = world.update(0.05, 150);
    let frame = frame_for(&frames, watcher).unwrap();
    let records: Vec<_> = frame
        .payloads
        .iter()
        .flat_map(|p| p.updates.iter())
        .filter(|u| u.entity == pawn)
        .collect();
    assert_eq!(records.len(), 1, "updates for one entity must merge");

    let record = records[0];
    assert!(record.flags.contains(
        DirtyFlags::POSITION | DirtyFlags::STATE | DirtyFlags::ACTION | DirtyFlags::OPTIONS
    ));
    assert_eq!(record.x, 17.0);
    assert_eq!(record.action, Some(7));
    assert_eq!(record.options.as_ref().unwrap().expression, Some(2));
}

#[test]
fn movement_clears_a_cancellable_expression_for_watchers() {
    let mut world = flat_world();
    let watcher = join(&mut world, "watcher");
    let mover = join(&mut world, "mover");
    world.update(0.05, 50);
    world.update(0.05, 100);
    let pawn = world.client(mover).unwrap().entity;

    world.set_entity_expression(pawn, Some(5), true).unwrap();
    world.update(0.05, 150);

    // The next accepted report drops the overlay; watchers get the cleared
    // options bag merged into the same record as the movement.
    world
        .handle_movement(mover, &report(17.0, 16.0, 100), 200)
        .unwrap();
    let frames = world.update(0.05, 200);
    let frame = frame_for(&frames, watcher).unwrap();
    let record = frame
        .payloads
        .iter()
        .flat_map(|p| p.updates.iter())
        .find(|u| u.entity == pawn)
        .unwrap();
    assert!(record
        .flags
        .contains(DirtyFlags::POSITION | DirtyFlags::OPTIONS));
    assert_eq!(record.options.as_ref().unwrap().expression, None);
}

#[test]
fn despawn_after_updates_broadcasts_only_the_removal() {
    let mut world = flat_world();
    let watcher = join(&mut world, "watcher");
    world.update(0.05, 50);

    let npc = world.spawn_npc("crab", Vec2::new(16.5, 16.5), 50);
    world.update(0.05, 100);

    // Update then despawn within the same tick.
    world.play_entity_action(npc, 1).unwrap();
    world.despawn_entity(npc).unwrap();
    let frames = world.update(0.05, 150);

    let frame = frame_for(&frames, watcher).unwrap();
    let payload = frame
        .payloads
        .iter()
        .find(|p| p.removes.contains(&npc))
        .unwrap();
    assert!(payload.updates.iter().all(|u| u.entity != npc));
    assert!(payload.adds.iter().all(|s| s.id != npc));
}

#[test]
fn payloads_reach_only_subscribed_clients() {
    let mut world = flat_world();
    let near = join(&mut world, "near");
    let far = join(&mut world, "far");
    world.update(0.05, 50);

    // Split the two viewers across opposite corners of the map.
    world
        .update_camera(near, Rect::new(0.0, 0.0, 6.0, 6.0))
        .unwrap();
    world
        .update_camera(far, Rect::new(26.0, 26.0, 6.0, 6.0))
        .unwrap();
    world.update(0.05, 100);

    let npc = world.spawn_npc("crab", Vec2::new(4.0, 4.0), 100);
    let frames = world.update(0.05, 150);

    let near_frame = frame_for(&frames, near).unwrap();
    assert!(near_frame
        .payloads
        .iter()
        .any(|p| p.adds.iter().any(|s| s.id == npc)));

    match frame_for(&frames, far) {
        None => {}
        Some(frame) => assert!(frame
            .payloads
            .iter()
            .all(|p| p.adds.iter().all(|s| s.id != npc))),
    }
}

#[test]
fn camera_move_swaps_subscriptions_with_notice_and_snapshot() {
    let mut world = flat_world();
    let client = join(&mut world, "roamer");
    world.update(0.05, 50);

    // Settle on a small viewport in one corner first.
    world
        .update_camera(client, Rect::new(0.0, 0.0, 8.0, 8.0))
        .unwrap();
    world.update(0.05, 100);
    let before = world.client(client).unwrap().subscriptions.clone();
    assert!(!before.is_empty());

    world
        .update_camera(client, Rect::new(24.0, 24.0, 8.0, 8.0))
        .unwrap();
    let frames = world.update(0.05, 150);
    let frame = frame_for(&frames, client).unwrap();

    assert!(!frame.unsubscribed.is_empty());
    assert!(!frame.snapshots.is_empty());
    for handle in &frame.unsubscribed {
        assert!(before.contains(handle));
    }

    let after = &world.client(client).unwrap().subscriptions;
    for snapshot in &frame.snapshots {
        assert!(after.contains(&snapshot.region));
        assert!(!before.contains(&snapshot.region));
    }
}

#[test]
fn fresh_subscription_gets_snapshot_instead_of_payload() {
    let mut world = flat_world();
    let watcher = join(&mut world, "watcher");
    let mover = join(&mut world, "mover");
    let frames = world.update(0.05, 50);

    // Join tick: snapshots only, even though the join itself queued region
    // adds.
    let frame = frame_for(&frames, watcher).unwrap();
    assert!(!frame.snapshots.is_empty());
    assert!(frame.payloads.is_empty());

    // The snapshot already contains both pawns.
    let mover_pawn = world.client(mover).unwrap().entity;
    assert!(frame
        .snapshots
        .iter()
        .any(|s| s.entities.iter().any(|e| e.id == mover_pawn)));
}

#[test]
fn disconnect_tears_down_silently_and_removes_the_pawn() {
    let mut world = flat_world();
    let watcher = join(&mut world, "watcher");
    let leaver = join(&mut world, "leaver");
    world.update(0.05, 50);
    let pawn = world.client(leaver).unwrap().entity;

    world.remove_client(leaver).unwrap();
    let frames = world.update(0.05, 100);

    // The leaver hears nothing; the watcher sees the pawn disappear.
    assert!(frame_for(&frames, leaver).is_none());
    let frame = frame_for(&frames, watcher).unwrap();
    assert!(frame
        .payloads
        .iter()
        .any(|p| p.removes.contains(&pawn)));
}

#[test]
fn accepted_movement_reaches_watchers_next_tick() {
    let mut world = flat_world();
    let watcher = join(&mut world, "watcher");
    let mover = join(&mut world, "mover");
    world.update(0.05, 50);
    world.update(0.05, 100);
    let pawn = world.client(mover).unwrap().entity;

    let outcome = world
        .handle_movement(mover, &report(18.0, 17.0, 100), 150)
        .unwrap();
    assert_eq!(outcome, MovementOutcome::Applied);

    let frames = world.update(0.05, 150);
    let frame = frame_for(&frames, watcher).unwrap();
    let update = frame
        .payloads
        .iter()
        .flat_map(|p| p.updates.iter())
        .find(|u| u.entity == pawn)
        .unwrap();
    assert!(update.flags.contains(DirtyFlags::POSITION));
    assert_eq!((update.x, update.y), (18.0, 17.0));
}

#[test]
fn off_map_movement_kicks_through_the_two_phase_path() {
    let mut world = flat_world();
    let mover = join(&mut world, "mover");
    world.update(0.05, 50);

    let outcome = world
        .handle_movement(mover, &report(40.0, 16.0, 100), 100)
        .unwrap();
    assert_eq!(outcome, MovementOutcome::Kicked(KickReason::OutsideMap));
    // Still connected until the notice is flushed.
    assert!(world.client(mover).is_some());

    let frames = world.update(0.05, 100);
    let frame = frame_for(&frames, mover).unwrap();
    assert!(frame.notices.iter().any(|n| matches!(
        n,
        ClientNotice::Kicked {
            reason: KickReason::OutsideMap
        }
    )));
    assert!(world.client(mover).is_none());
}

#[test]
fn position_fix_gates_movement_until_acknowledged() {
    let mut config = WorldConfig::default();
    config.movement.teleport_policy = TeleportPolicy::Correct;
    config.movement.teleport_threshold = 1;
    let mut world = flat_world_with(config);

    let mover = join(&mut world, "mover");
    world.update(0.05, 50);

    world
        .handle_movement(mover, &report(16.0, 16.0, 0), 1_000)
        .unwrap();
    let outcome = world
        .handle_movement(mover, &report(30.0, 16.0, 100), 1_100)
        .unwrap();
    assert_eq!(outcome, MovementOutcome::Fixed);

    let frames = world.update(0.05, 1_150);
    let frame = frame_for(&frames, mover).unwrap();
    assert!(frame
        .notices
        .iter()
        .any(|n| matches!(n, ClientNotice::FixPosition { .. })));

    // Reports are dropped until the ack, then flow again.
    let outcome = world
        .handle_movement(mover, &report(17.0, 16.0, 200), 1_200)
        .unwrap();
    assert_eq!(outcome, MovementOutcome::Ignored);

    world.acknowledge_position_fix(mover).unwrap();
    let outcome = world
        .handle_movement(mover, &report(17.0, 16.0, 300), 1_300)
        .unwrap();
    assert_eq!(outcome, MovementOutcome::Applied);
}

#[test]
fn replaying_the_clock_emits_no_duplicate_traffic() {
    let mut world = flat_world();
    let watcher = join(&mut world, "watcher");
    let mover = join(&mut world, "mover");
    world.update(0.05, 50);

    world
        .handle_movement(mover, &report(17.0, 17.0, 100), 100)
        .unwrap();
    let frames = world.update(0.05, 100);
    assert!(frame_for(&frames, watcher).is_some());

    // Same clock again: batches are drained and advancement is gated.
    let frames = world.update(0.05, 100);
    assert!(frames.is_empty());
}

#[test]
fn walking_along_a_region_edge_does_not_thrash_membership() {
    let mut world = flat_world();
    let watcher = join(&mut world, "watcher");
    world.update(0.05, 50);

    let npc = world.spawn_npc("crab", Vec2::new(7.5, 4.0), 50);
    world
        .update_camera(watcher, Rect::new(0.0, 0.0, 20.0, 20.0))
        .unwrap();
    world.update(0.05, 100);
    let home = world.entity(npc).unwrap().region.unwrap();
    assert_eq!((home.rx, home.ry), (0, 0));

    // Dither across the cell edge at x=8, always within the border.
    let mut now = 100;
    for x in [8.2_f32, 7.8, 8.4, 7.6, 8.3] {
        now += 50;
        world.teleport_entity(npc, Vec2::new(x, 4.0), now).unwrap();
        let frames = world.update(0.05, now);
        if let Some(frame) = frame_for(&frames, watcher) {
            for payload in &frame.payloads {
                assert!(payload.adds.iter().all(|s| s.id != npc));
                assert!(!payload.removes.contains(&npc));
            }
        }
        assert_eq!(world.entity(npc).unwrap().region, Some(home));
    }

    // A real departure does transfer, with a remove/add pair.
    now += 50;
    world.teleport_entity(npc, Vec2::new(12.0, 4.0), now).unwrap();
    let frames = world.update(0.05, now);
    let frame = frame_for(&frames, watcher).unwrap();
    let removed = frame
        .payloads
        .iter()
        .any(|p| p.region == home && p.removes.contains(&npc));
    let added = frame
        .payloads
        .iter()
        .any(|p| p.region != home && p.adds.iter().any(|s| s.id == npc));
    assert!(removed && added);
    assert_ne!(world.entity(npc).unwrap().region, Some(home));
}

#[test]
fn camera_shift_yields_one_snapshot_and_two_unsubscribes() {
    // Zero margin so the desired set is exactly the regions under the
    // camera, making the counts below deterministic.
    let mut config = WorldConfig::default();
    config.interest_margin = 0.0;
    let mut world = flat_world_with(config);
    let client = join(&mut world, "roamer");
    world.update(0.05, 50);

    // Two regions tall in the west column.
    world
        .update_camera(client, Rect::new(1.0, 1.0, 6.0, 14.0))
        .unwrap();
    world.update(0.05, 100);
    assert_eq!(world.client(client).unwrap().subscriptions.len(), 2);

    // One region, one column east: both old cells drop, one new arrives.
    world
        .update_camera(client, Rect::new(9.0, 1.0, 6.0, 6.0))
        .unwrap();
    let frames = world.update(0.05, 150);
    let frame = frame_for(&frames, client).unwrap();

    assert_eq!(frame.unsubscribed.len(), 2);
    assert_eq!(frame.snapshots.len(), 1);
    assert_eq!(
        frame.snapshots[0].region,
        RegionHandle {
            map: MapId(0),
            rx: 1,
            ry: 0
        }
    );
}

#[test]
fn region_scan_keeps_every_mover_inside_its_boundary() {
    let mut world = flat_world();
    let npc = world.spawn_npc("crab", Vec2::new(2.5, 2.5), 0);
    world.set_entity_velocity(npc, Vec2::new(3.0, 2.0));
    let home = world.entity(npc).unwrap().region.unwrap();

    // Walk diagonally across a region edge; after every scan the entity
    // must sit inside its assigned region's hysteresis boundary.
    for i in 1..=60u64 {
        world.update(0.05, i * 50);
        let entity = world.entity(npc).unwrap();
        let handle = entity.region.unwrap();
        let region = world.primary_map().region_by_handle(handle);
        assert!(
            region.boundary.contains(entity.position),
            "tick {i}: {:?} escaped boundary of {:?}",
            entity.position,
            handle
        );
    }

    // Three seconds at (3, 2) leaves the home cell behind.
    assert_ne!(world.entity(npc).unwrap().region, Some(home));
}

#[test]
fn interest_pass_matches_margin_expanded_camera_coverage() {
    let mut world = flat_world();
    let margin = world.config().interest_margin;
    let client = join(&mut world, "roamer");
    world.update(0.05, 50);

    let cameras = [
        Rect::new(2.0, 2.0, 10.0, 8.0),
        Rect::new(20.0, 5.0, 30.0, 30.0),
        // Mostly off the map: only the clamped overlap counts.
        Rect::new(-6.0, -6.0, 4.0, 4.0),
    ];
    for camera in cameras {
        world.update_camera(client, camera).unwrap();
        world.update(0.05, world.now_ms() + 50);
        let expected = desired_regions(world.primary_map(), camera, margin);
        assert_eq!(world.client(client).unwrap().subscriptions, expected);
    }
}

#[test]
fn reset_rebuilds_controller_content_and_keeps_players() {
    let mut world = flat_world();
    world.add_controller(Box::new(PatrolController::new(
        "patrol",
        "crab",
        Vec2::new(10.5, 10.5),
        2.0,
        1.5,
    )));
    let watcher = join(&mut world, "watcher");
    world.update(0.05, 50);
    world.update(0.05, 100);

    let old_crab = world
        .entities()
        .find(|e| e.kind == EntityKind::Npc)
        .unwrap()
        .id;

    world.reset(150);
    let new_crab = world
        .entities()
        .find(|e| e.kind == EntityKind::Npc)
        .unwrap()
        .id;
    assert_ne!(old_crab, new_crab);
    assert!(world.client(watcher).is_some());
    assert!(world.entity(world.client(watcher).unwrap().entity).is_some());

    // Subscribers see the swap as a removal plus an add.
    let frames = world.update(0.05, 150);
    let frame = frame_for(&frames, watcher).unwrap();
    assert!(frame
        .payloads
        .iter()
        .any(|p| p.removes.contains(&old_crab)));
    assert!(frame
        .payloads
        .iter()
        .any(|p| p.adds.iter().any(|s| s.id == new_crab)));
}
