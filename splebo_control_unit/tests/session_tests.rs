//! Robot session integration tests against the simulated controller and
//! CAN network.
//!
//! Verifies:
//! 1. Jog never starts toward a soft limit the axis already sits on.
//! 2. Bridge results land in the submitter's slot under concurrent callers.
//! 3. Homing groups run in ascending origin order; group members interleave.
//! 4. `jog_stop` and `stop_all` are no-ops without work to stop.
//! 5. The soft-limit monitor issues exactly one stop.
//! 6. Teaching points round-trip through the session and the store file.
//! 7. A failed CAN board does not block its neighbour.
//! 8. End-to-end jog into the limit stops at or below it.
//! 9. Homing is refused during a jog; jogs and point moves are refused
//!    during homing.
//! 10. A fault during a point move stops every axis of the move.
//! 11. The panel emergency switch halts a jog and latches the fault.
//! 12. Point sequences visit their points in order.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use splebo_common::axis::JogDirection;
use splebo_common::axis::config::{AxisConfig, MotorFamily};
use splebo_common::axis::params::AxisParameterStore;
use splebo_common::config::{
    CanConfig, IoConfig, JogConfig, MotionConfig, PositionFormat, RobotConfig, StorageConfig,
};
use splebo_common::error::ErrorKind;
use splebo_common::io::ports::InputPort;
use splebo_control_unit::homing::HomingState;
use splebo_control_unit::sequence::SequenceState;
use splebo_control_unit::teaching::PositionTable;
use splebo_control_unit::{CommandBridge, CommandReply, MotionCommand, RobotSession};
use splebo_hal::CanBus;
use splebo_hal::drivers::simulation::{
    SimulatedCanNetwork, SimulatedMotionController, SimulationHandle,
};

// ─── Helpers ────────────────────────────────────────────────────────

const JOG_POLL_MS: u64 = 20;

struct Rig {
    session: RobotSession,
    sim: SimulationHandle,
    net: SimulatedCanNetwork,
    _dir: tempfile::TempDir,
}

fn config(dir: &tempfile::TempDir, boards: &[u8], io_board: u8) -> RobotConfig {
    RobotConfig {
        motion: MotionConfig {
            bridge_idle_ms: 1,
            homing_tick_ms: 2,
            homing_timeout_ms: 10_000,
            clear_pulse_ms: 5,
            ..MotionConfig::default()
        },
        jog: JogConfig {
            poll_interval_ms: JOG_POLL_MS,
            ..JogConfig::default()
        },
        can: CanConfig {
            boards: boards.to_vec(),
            poll_interval_ms: 2,
            inter_board_delay_ms: 0,
            ..CanConfig::default()
        },
        io: IoConfig {
            board_id: io_board,
            emergency_poll_ms: 5,
            ..IoConfig::default()
        },
        storage: StorageConfig {
            positions: dir.path().join("teach.json"),
            position_format: PositionFormat::Json,
            ..StorageConfig::default()
        },
        ..RobotConfig::default()
    }
}

fn rig_with(params: AxisParameterStore, boards: &[u8], io_board: u8) -> Rig {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(&dir, boards, io_board);
    let dev = SimulatedMotionController::new();
    let sim = dev.handle();
    let net = SimulatedCanNetwork::new();
    for &b in boards {
        net.attach_board(b);
    }
    let can = CanBus::new(Box::new(net.chip()), config.can.clone());
    let session = RobotSession::new(config);
    session
        .connect_with(Box::new(dev), Some(can), params)
        .expect("connect failed");
    Rig {
        session,
        sim,
        net,
        _dir: dir,
    }
}

fn rig() -> Rig {
    rig_with(AxisParameterStore::default(), &[0], 0)
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

// ─── Test 1: jog respects soft limits ───────────────────────────────

#[test]
fn test_jog_never_starts_past_limit() {
    let rig = rig();
    let cfg = rig.session.get_config().unwrap();
    for limits in cfg.axes.iter().filter(|a| a.configured) {
        let axis = limits.axis;
        let at_max = (limits.limit_plus / 0.01).round() as i32;
        for speed in [1.0, 10.0, 55.5, 100.0] {
            rig.sim.set_position(axis, at_max);
            let jogs = rig.sim.jog_count(axis);
            let err = rig
                .session
                .jog_start(axis, JogDirection::Cw, speed)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert_eq!(rig.sim.jog_count(axis), jogs);

            rig.sim.set_position(axis, 0);
            let err = rig
                .session
                .jog_start(axis, JogDirection::Ccw, speed)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert_eq!(rig.sim.jog_count(axis), jogs);
        }
    }
}

#[test]
fn test_jog_speed_window_enforced() {
    let rig = rig();
    for speed in [0.0, 0.5, 100.1] {
        let err = rig
            .session
            .jog_start(0, JogDirection::Cw, speed)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    let err = rig.session.jog_start(3, JogDirection::Cw, 10.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(rig.sim.jog_count(0), 0);
}

// ─── Test 2: bridge correlation ─────────────────────────────────────

#[test]
fn test_bridge_results_reach_their_submitter() {
    const CALLERS: usize = 8;
    const ROUNDS: i32 = 25;
    let bridge = Arc::new(
        CommandBridge::start(
            Box::new(SimulatedMotionController::new()),
            CALLERS * ROUNDS as usize * 2 + 1,
            Duration::from_millis(1),
        )
        .unwrap(),
    );
    bridge
        .execute(MotionCommand::Open, Duration::from_secs(2))
        .unwrap();

    let workers: Vec<_> = (0..CALLERS)
        .map(|caller| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                let axis = caller as u8;
                for round in 0..ROUNDS {
                    let pulses = caller as i32 * 10_000 + round;
                    let set = bridge
                        .submit(MotionCommand::SetLogicalCoord { axis, pulses })
                        .unwrap();
                    assert_eq!(
                        bridge.await_result(set, Duration::from_secs(2)).unwrap(),
                        CommandReply::Done
                    );
                    let get = bridge
                        .submit(MotionCommand::GetLogicalCoord { axis })
                        .unwrap();
                    let reply = bridge.await_result(get, Duration::from_secs(2)).unwrap();
                    assert_eq!(reply.value(), Some(pulses as i64), "caller {caller}");
                }
            })
        })
        .collect();
    for w in workers {
        w.join().expect("caller panicked");
    }
    assert_eq!(bridge.processed(), 1 + (CALLERS as u64) * (ROUNDS as u64) * 2);
    bridge.shutdown();
}

// ─── Test 3: homing order ───────────────────────────────────────────

#[test]
fn test_homing_groups_follow_origin_order() {
    // Default store: X and Y in group 2, Z in group 1.
    let rig = rig();
    rig.sim.set_speed_scale(20.0);
    rig.sim.set_position(0, 5_000);
    rig.sim.set_position(1, 7_000);
    rig.sim.set_position(2, 3_000);

    let report = rig.session.home_all().unwrap();
    assert_eq!(report.homed.len(), 3);

    let status = rig.session.status();
    let events = &status.homing.events;
    let last_z = events.iter().rposition(|e| e.axis == 2).unwrap();
    let first_xy = events.iter().position(|e| e.axis != 2).unwrap();
    assert!(last_z < first_xy, "Z must finish before X/Y start");
    assert_eq!(events[last_z].state, HomingState::End);
    assert!(events.iter().filter(|e| e.axis == 2).all(|e| e.turn == 1));
    assert!(events.iter().filter(|e| e.axis != 2).all(|e| e.turn == 2));

    // X and Y step together.
    let first_x = events.iter().position(|e| e.axis == 0).unwrap();
    let last_x = events.iter().rposition(|e| e.axis == 0).unwrap();
    let first_y = events.iter().position(|e| e.axis == 1).unwrap();
    let last_y = events.iter().rposition(|e| e.axis == 1).unwrap();
    assert!(first_y < last_x && first_x < last_y);

    for axis in 0..8 {
        assert!(status.axes[axis].homed, "axis {axis} not homed");
        assert!(!status.axes[axis].homing_error);
    }
    assert!(!status.homing.running);
    assert_eq!(&rig.session.get_positions().unwrap()[..3], &[0.0, 0.0, 0.0]);
}

#[test]
fn test_homing_alarm_surfaces_and_latches() {
    let rig = rig();
    rig.sim.set_alarm(1, true);
    let err = rig.session.home_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SafetyFault);
    let status = rig.session.status();
    assert!(status.axes[1].homed);
    assert!(status.axes[1].homing_error);
    assert!(status.safety_fault.is_some());

    let err = rig.session.jog_start(0, JogDirection::Cw, 10.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SafetyFault);

    rig.sim.set_alarm(1, false);
    rig.session.reset_alarm().unwrap();
    assert!(rig.session.status().safety_fault.is_none());
    rig.session.home_axis(1).unwrap();
    assert!(!rig.session.status().axes[1].homing_error);
}

// ─── Test 4: idempotent stops ───────────────────────────────────────

#[test]
fn test_jog_stop_twice_is_noop() {
    let rig = rig();
    rig.session.jog_stop(0).unwrap();
    rig.session.jog_stop(0).unwrap();
    assert!(rig.session.status().jogs.is_empty());
    assert!(!rig.sim.is_moving(0));
}

#[test]
fn test_stop_all_on_unconfigured_robot() {
    let rig = rig_with(AxisParameterStore::new(Vec::new()).unwrap(), &[0], 0);
    rig.session.stop_all().unwrap();
    for axis in 0..8 {
        assert_eq!(rig.sim.stop_count(axis), 0);
    }
    rig.session.jog_stop(2).unwrap();
    assert_eq!(rig.sim.stop_count(2), 0);

    let unconnected = RobotSession::new(RobotConfig::default());
    unconnected.stop_all().unwrap();
}

// ─── Test 5: monitor stops once ─────────────────────────────────────

#[test]
fn test_monitor_issues_exactly_one_stop() {
    let rig = rig();
    rig.sim.set_position(0, 30_000);
    rig.session.jog_start(0, JogDirection::Cw, 10.0).unwrap();
    assert_eq!(rig.session.status().jogs.len(), 1);

    assert!(wait_until(Duration::from_secs(3), || rig.sim.stop_count(0) >= 1));
    assert!(wait_until(Duration::from_secs(1), || rig
        .session
        .status()
        .jogs
        .is_empty()));
    thread::sleep(Duration::from_millis(JOG_POLL_MS * 4));
    assert_eq!(rig.sim.stop_count(0), 1);
    assert!(!rig.sim.is_moving(0));
}

// ─── Test 6: teaching round trip ────────────────────────────────────

#[test]
fn test_position_round_trip() {
    let rig = rig();
    rig.sim.set_position(0, 1_234);
    rig.sim.set_position(1, 5_678);
    rig.sim.set_position(2, 910);

    rig.session.register_point_from_current(5, "test").unwrap();
    let p = rig.session.get_position_table_point(5).unwrap();
    assert_eq!((p.x, p.y, p.z), (12.34, 56.78, 9.1));
    assert_eq!(p.comment, "test");
    assert!(p.is_absolute);

    rig.session
        .update_position_table_point(5, 1.0, 2.0, 3.0, "new")
        .unwrap();
    let p = rig.session.get_position_table_point(5).unwrap();
    assert_eq!((p.x, p.y, p.z), (1.0, 2.0, 3.0));
    assert_eq!(p.comment, "new");

    let numbers: Vec<u32> = rig
        .session
        .get_position_table_all()
        .unwrap()
        .iter()
        .map(|p| p.point_no)
        .collect();
    assert_eq!(numbers, [1, 5]);

    let stored = PositionTable::load(rig.session.positions_path(), PositionFormat::Json).unwrap();
    assert_eq!(stored.get(5).unwrap().comment, "new");

    let err = rig.session.get_position_table_point(6).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// ─── Test 7: CAN fault isolation ────────────────────────────────────

#[test]
fn test_failed_board_does_not_block_neighbour() {
    let rig = rig_with(AxisParameterStore::default(), &[3, 4], 4);
    rig.net.set_faulty(3, true);
    rig.net.set_input_bit(4, 4, true);

    assert!(wait_until(Duration::from_secs(1), || rig.session.io_input(4, 4).unwrap()));
    assert!(wait_until(Duration::from_secs(1), || rig
        .session
        .status()
        .can_boards
        == [4]));

    rig.session.io_output(4, 110, true).unwrap();
    assert!(wait_until(Duration::from_secs(1), || rig.net.output_bit(4, 10)));
}

// ─── Test 8: end to end ─────────────────────────────────────────────

#[test]
fn test_jog_into_limit_stops_at_limit() {
    let params = AxisParameterStore::new(vec![
        AxisConfig::with_motor(MotorFamily::ActuatorA, 300.0, 2),
        AxisConfig::with_motor(MotorFamily::ActuatorA, 300.0, 2),
        AxisConfig::with_motor(MotorFamily::ActuatorA, 100.0, 1),
    ])
    .unwrap();
    let rig = rig_with(params, &[0], 0);
    rig.sim.set_position(0, 29_500);

    rig.session.jog_start(0, JogDirection::Cw, 10.0).unwrap();

    let mut reached = None;
    assert!(wait_until(Duration::from_secs(5), || {
        if reached.is_none() && rig.sim.position(0) >= 30_000 {
            reached = Some(Instant::now());
        }
        rig.sim.stop_count(0) >= 1
    }));
    let stopped = Instant::now();
    let reached = reached.unwrap_or(stopped);
    assert!(
        stopped.duration_since(reached) <= Duration::from_millis(JOG_POLL_MS * 2 + 100),
        "stop took {:?}",
        stopped.duration_since(reached)
    );

    let position = rig.session.get_positions().unwrap()[0];
    assert!(position <= 300.0, "position {position}");
    assert_eq!(rig.sim.stop_count(0), 1);
}

// ─── Test 9: homing exclusion ───────────────────────────────────────

#[test]
fn test_homing_excludes_jog_and_point_moves() {
    let rig = rig();
    rig.session
        .update_position_table_point(7, 10.0, 10.0, 10.0, "near")
        .unwrap();

    rig.session.jog_start(0, JogDirection::Cw, 10.0).unwrap();
    let err = rig.session.home_all().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = rig.session.home_axis(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let status = rig.session.status();
    assert_eq!(status.jogs.len(), 1);
    assert!(!status.homing.running);
    assert!(rig.sim.is_moving(0));
    rig.session.jog_stop(0).unwrap();

    // Z never finds its origin, so homing stays in group 1.
    rig.sim.set_origin_stall(2, true);
    rig.sim.set_position(2, 5_000);
    thread::scope(|s| {
        let homing = s.spawn(|| rig.session.home_all());
        assert!(wait_until(Duration::from_secs(2), || rig
            .session
            .status()
            .homing
            .running));

        let err = rig
            .session
            .jog_start(0, JogDirection::Cw, 10.0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = rig.session.move_to_point(7, 10.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(rig.sim.jog_count(0), 1);

        rig.session.stop_all().unwrap();
        let err = homing.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SafetyFault);
    });
    assert!(!rig.session.status().homing.running);
}

// ─── Test 10: point move fault ──────────────────────────────────────

#[test]
fn test_point_move_fault_stops_every_axis() {
    let rig = rig();
    rig.session
        .update_position_table_point(8, 250.0, 250.0, 90.0, "far")
        .unwrap();

    thread::scope(|s| {
        let mover = s.spawn(|| rig.session.move_to_point(8, 10.0));
        assert!(wait_until(Duration::from_secs(2), || (0..3)
            .all(|axis| rig.sim.is_moving(axis))));

        let err = rig.session.home_all().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        thread::sleep(Duration::from_millis(200));
        rig.sim.set_emergency(0, true);
        let err = mover.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SafetyFault);
    });

    for axis in 0..3 {
        assert!(!rig.sim.is_moving(axis), "axis {axis} still moving");
    }
    assert!(rig.sim.stop_count(1) >= 1);
    assert!(rig.sim.stop_count(2) >= 1);
    assert!(rig.session.status().safety_fault.is_some());
    assert!(rig.session.get_positions().unwrap()[1] < 250.0);
}

// ─── Test 11: emergency switch ──────────────────────────────────────

#[test]
fn test_emergency_switch_halts_jog_and_latches() {
    let rig = rig();
    let emg = InputPort::EmgSw.bit();
    rig.session.jog_start(0, JogDirection::Cw, 10.0).unwrap();
    assert!(rig.sim.is_moving(0));

    rig.net.set_input_bit(0, emg, true);
    assert!(wait_until(Duration::from_secs(2), || rig
        .session
        .status()
        .safety_fault
        .is_some()));
    assert!(wait_until(Duration::from_secs(1), || !rig.sim.is_moving(0)));
    assert!(rig.session.status().jogs.is_empty());
    assert!(rig.session.get_emg_status().unwrap());
    let err = rig
        .session
        .jog_start(0, JogDirection::Cw, 10.0)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SafetyFault);

    // Still held: a reset does not stick.
    rig.session.reset_alarm().unwrap();
    assert!(wait_until(Duration::from_secs(2), || rig
        .session
        .status()
        .safety_fault
        .is_some()));

    rig.net.set_input_bit(0, emg, false);
    assert!(wait_until(Duration::from_secs(2), || !rig
        .session
        .get_emg_status()
        .unwrap()));
    rig.session.reset_alarm().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(rig.session.status().safety_fault.is_none());
    rig.session.jog_start(0, JogDirection::Cw, 10.0).unwrap();
    rig.session.jog_stop(0).unwrap();
}

// ─── Test 12: point sequence ────────────────────────────────────────

#[test]
fn test_point_sequence_visits_points_in_order() {
    let rig = rig();
    rig.sim.set_speed_scale(50.0);
    for (point_no, x) in [(11, 5.0), (12, 20.0), (13, 10.0)] {
        rig.session
            .update_position_table_point(point_no, x, x, 5.0, "")
            .unwrap();
    }

    let progress = rig.session.run_point_sequence(&[12, 11, 13], 50.0).unwrap();
    assert_eq!(progress.state, SequenceState::Completed);
    assert_eq!(progress.step, 3);
    assert_eq!(progress.point_no, Some(13));
    assert_eq!(&rig.session.get_positions().unwrap()[..3], &[10.0, 10.0, 5.0]);

    // Unknown points are rejected before anything moves.
    let moves = rig.sim.command_count();
    let err = rig
        .session
        .run_point_sequence(&[11, 99], 50.0)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(rig.sim.command_count(), moves);
    assert_eq!(rig.session.sequence_progress().state, SequenceState::Completed);
}
