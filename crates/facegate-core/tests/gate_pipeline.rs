use std::cell::RefCell;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use facegate_core::errors::{AppError, AppResult};
use facegate_core::faces::{
    EmbeddingVector, FaceDatabase, FaceMatcher, FaceObservation, FilesystemRecordStore, ListKind,
    LoadOutcome, MatchOutcome, MemoryRecordStore,
};
use facegate_core::{
    ActuatorStatus, FaceGate, GateConfig, GateStage, LockEvent, LockState, SessionConfig,
    UnlockActuator, UnlockPolicy,
};
use tempfile::TempDir;

#[test]
fn integration_enroll_persist_reload_and_unlock() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemRecordStore::new(tmp.path().join("faces.json"));

    let enrolled = FaceDatabase::with_dimension(4);
    enrolled
        .add_face(vector(&[0.9, 0.1, 0.0, 0.1]), "alice")
        .unwrap();
    enrolled
        .add_to_deny_list(vector(&[0.0, 0.0, 1.0, 0.0]), "mallory")
        .unwrap();
    enrolled.save(&store).unwrap();

    let reloaded = FaceDatabase::with_dimension(4);
    assert_eq!(
        reloaded.load(&store).unwrap(),
        LoadOutcome::Loaded { records: 2 }
    );
    assert!(reloaded.contains("alice", ListKind::Allow));
    assert!(reloaded.contains("mallory", ListKind::Deny));

    let mut gate = FaceGate::new(
        Arc::new(reloaded),
        GateConfig {
            session: SessionConfig {
                window: Duration::from_millis(1500),
                min_samples: 5,
                agreement_ratio: 0.6,
            },
            ..GateConfig::default()
        },
    );
    let mut actuator = RecordingActuator::completing();
    let base = Instant::now();

    let mut last = None;
    for i in 0..5 {
        let observation = FaceObservation::new(
            vector(&[0.9, 0.1, 0.0, 0.1]),
            0.98,
            base + Duration::from_millis(i * 200),
        );
        last = Some(gate.observe(observation, &mut actuator).unwrap());
    }

    match last.unwrap().stage {
        GateStage::Decided {
            verdict,
            decision,
            event,
        } => {
            assert_eq!(verdict.outcome, MatchOutcome::Allowed("alice".into()));
            assert!(decision.recognized);
            assert!((decision.confidence - 1.0).abs() < 1e-6);
            assert!(matches!(event, LockEvent::Unlocked));
        }
        other => panic!("unexpected stage: {:?}", other),
    }
    assert_eq!(gate.state(), LockState::Unlocked);
    assert_eq!(actuator.calls.borrow().len(), 1);
}

#[test]
fn integration_repeated_failures_cool_down_then_recover() {
    let db = FaceDatabase::new();
    db.add_face(vector(&[1.0, 0.0]), "alice").unwrap();
    let mut gate = FaceGate::new(
        Arc::new(db),
        GateConfig {
            session: SessionConfig {
                window: Duration::from_millis(500),
                min_samples: 1,
                agreement_ratio: 0.6,
            },
            unlock: UnlockPolicy {
                unlock_confidence_threshold: 0.7,
                max_attempts: 3,
                attempt_window: Duration::from_secs(60),
                cooldown: Duration::from_secs(10),
            },
            ..GateConfig::default()
        },
    );
    let mut actuator = RecordingActuator::completing();
    let base = Instant::now();

    // A stranger triggers three rejected windows.
    for i in 0..3u64 {
        let observation = FaceObservation::new(
            vector(&[0.0, 1.0]),
            0.99,
            base + Duration::from_millis(i * 1000),
        );
        gate.observe(observation, &mut actuator).unwrap();
    }
    assert_eq!(gate.state(), LockState::Cooldown);

    // The enrolled user is turned away until the cooldown ends.
    let during = FaceObservation::new(vector(&[1.0, 0.0]), 0.99, base + Duration::from_secs(5));
    let outcome = gate.observe(during, &mut actuator).unwrap();
    assert!(matches!(
        outcome.stage,
        GateStage::Decided {
            event: LockEvent::Ignored {
                state: LockState::Cooldown
            },
            ..
        }
    ));
    assert!(actuator.calls.borrow().is_empty());

    let elapsed = gate.tick(base + Duration::from_secs(13));
    assert!(matches!(elapsed, Some(LockEvent::CooldownElapsed)));
    assert_eq!(gate.state(), LockState::Locked);

    let after = FaceObservation::new(vector(&[1.0, 0.0]), 0.99, base + Duration::from_secs(14));
    gate.observe(after, &mut actuator).unwrap();
    assert_eq!(gate.state(), LockState::Unlocked);
    assert_eq!(actuator.calls.borrow().len(), 1);
}

#[test]
fn integration_deferred_actuator_completion() {
    let db = FaceDatabase::new();
    db.add_face(vector(&[1.0, 0.0]), "alice").unwrap();
    let mut gate = FaceGate::new(
        Arc::new(db),
        GateConfig {
            session: SessionConfig {
                min_samples: 1,
                ..SessionConfig::default()
            },
            ..GateConfig::default()
        },
    );
    let mut actuator = RecordingActuator::deferred();
    let now = Instant::now();

    let outcome = gate
        .observe(FaceObservation::new(vector(&[1.0, 0.0]), 0.99, now), &mut actuator)
        .unwrap();
    assert!(matches!(
        outcome.stage,
        GateStage::Decided {
            event: LockEvent::UnlockPending,
            ..
        }
    ));
    assert_eq!(gate.state(), LockState::Unlocking);

    let outcome = gate
        .observe(FaceObservation::new(vector(&[1.0, 0.0]), 0.99, now), &mut actuator)
        .unwrap();
    assert!(matches!(
        outcome.stage,
        GateStage::Idle {
            state: LockState::Unlocking
        }
    ));

    assert!(matches!(
        gate.complete_unlock(Ok(()), now),
        LockEvent::Unlocked
    ));
    assert_eq!(actuator.calls.borrow().len(), 1);
}

#[test]
fn concurrent_readers_share_the_database() {
    let db = Arc::new(FaceDatabase::new());
    db.add_face(vector(&[1.0, 0.0, 0.0]), "alice").unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let probe = vector(&[1.0, 0.0, 0.0]);
                for _ in 0..200 {
                    let hit = db.find_nearest(&probe, ListKind::Allow, 0.5).unwrap();
                    assert!(hit.is_some());
                }
            })
        })
        .collect();

    for i in 0..50 {
        db.add_face(vector(&[0.0, 1.0, i as f32]), &format!("user-{i}"))
            .unwrap();
    }
    for handle in readers {
        handle.join().unwrap();
    }
    assert_eq!(db.len(), 51);
}

#[test]
fn matching_sees_one_snapshot_while_reloading() {
    let snapshot = |list_kind: ListKind, label: &str| {
        let db = FaceDatabase::new();
        match list_kind {
            ListKind::Allow => db.add_face(vector(&[1.0, 0.0]), label).unwrap(),
            ListKind::Deny => db.add_to_deny_list(vector(&[1.0, 0.0]), label).unwrap(),
        }
        let store = MemoryRecordStore::new();
        db.save(&store).unwrap();
        store.payload().unwrap()
    };
    let allow_only = snapshot(ListKind::Allow, "alice");
    let deny_only = snapshot(ListKind::Deny, "mallory");

    let db = Arc::new(FaceDatabase::new());
    db.load(&MemoryRecordStore::with_payload(allow_only.clone()))
        .unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let matcher = FaceMatcher::default();
                let probe = vector(&[1.0, 0.0]);
                for _ in 0..500 {
                    let verdict = matcher.match_probe(&probe, &db).unwrap();
                    assert_ne!(verdict.outcome, MatchOutcome::Unknown);
                }
            })
        })
        .collect();

    for i in 0..500 {
        let payload = if i % 2 == 0 { &deny_only } else { &allow_only };
        db.load(&MemoryRecordStore::with_payload(payload.clone()))
            .unwrap();
    }
    for handle in readers {
        handle.join().unwrap();
    }
}

#[test]
fn corrupt_store_on_disk_keeps_prior_records() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("faces.json");
    std::fs::write(&path, "{ not json").unwrap();

    let db = FaceDatabase::new();
    db.add_face(vector(&[1.0, 0.0]), "alice").unwrap();
    let err = db.load(&FilesystemRecordStore::new(&path)).unwrap_err();
    assert!(matches!(err, AppError::CorruptStore { .. }));
    assert_eq!(db.len(), 1);
}

struct RecordingActuator {
    status: ActuatorStatus,
    calls: RefCell<Vec<ActuatorStatus>>,
}

impl RecordingActuator {
    fn completing() -> Self {
        Self {
            status: ActuatorStatus::Completed,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn deferred() -> Self {
        Self {
            status: ActuatorStatus::InProgress,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl UnlockActuator for RecordingActuator {
    fn perform_unlock(&mut self) -> AppResult<ActuatorStatus> {
        self.calls.borrow_mut().push(self.status);
        Ok(self.status)
    }
}

fn vector(values: &[f32]) -> EmbeddingVector {
    EmbeddingVector::new(values.to_vec()).unwrap()
}
