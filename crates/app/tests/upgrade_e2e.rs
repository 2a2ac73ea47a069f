//! End-to-end upgrade flow: plan on disk, handler bound at boot, store
//! rewrite and migrations at the plan height, clean restart afterwards.

use std::path::PathBuf;
use std::sync::Arc;

use dstate_app::App;
use dstate_common::{AppModule, Config, MemoryMultiStore, ModuleError, ModuleRegistry, MultiStore};
use dstate_consensus::{ConsensusApp, FinalizeBlockRequest};
use dstate_upgrade::{
    default_handler, write_plan, PendingPlan, StoreDelta, UpgradeDescriptor, UpgradeRegistry,
    UpgradeState,
};

/// Module that stamps its own store when migrated.
struct FeeModule {
    name: &'static str,
    version: u64,
}

impl AppModule for FeeModule {
    fn name(&self) -> &str {
        self.name
    }

    fn consensus_version(&self) -> u64 {
        self.version
    }

    fn migrate(&self, from: u64, store: &mut dyn MultiStore) -> Result<(), ModuleError> {
        store
            .set(self.name, b"schema", from.to_string().as_bytes())
            .map_err(|e| ModuleError::MigrationFailed {
                module: self.name.to_string(),
                reason: e.to_string(),
            })
    }
}

fn registry() -> Arc<UpgradeRegistry> {
    let mut registry = UpgradeRegistry::new();
    registry
        .register(UpgradeDescriptor::new(
            "v0.7.0",
            default_handler(),
            StoreDelta::adding(["feegrant", "feemarket"]),
        ))
        .expect("register v0.7.0");
    registry
        .register(UpgradeDescriptor::new(
            "v0.8.0",
            default_handler(),
            StoreDelta::default(),
        ))
        .expect("register v0.8.0");
    Arc::new(registry)
}

fn modules() -> ModuleRegistry {
    let mut modules = ModuleRegistry::new();
    modules
        .register(Box::new(FeeModule {
            name: "feegrant",
            version: 1,
        }))
        .expect("register feegrant");
    modules
        .register(Box::new(FeeModule {
            name: "feemarket",
            version: 1,
        }))
        .expect("register feemarket");
    modules
}

fn config(plan_path: &PathBuf) -> Config {
    Config {
        plan_path: Some(plan_path.display().to_string()),
        skip_heights: Some(Vec::new()),
        retain_blocks: Some(0),
        health_env_var: None,
    }
}

fn finalize(app: &mut App, height: i64) -> dstate_consensus::FinalizeBlockResponse {
    app.finalize_block(FinalizeBlockRequest {
        height,
        txs: vec![],
        misbehavior: vec![],
    })
    .expect("finalize")
}

#[test]
fn upgrade_applies_exactly_at_plan_height() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan_path = dir.path().join("upgrade-info.json");
    write_plan(
        &plan_path,
        &PendingPlan {
            name: "v0.7.0".to_string(),
            height: 100,
        },
    )
    .expect("write plan");

    let mut app = App::load(
        &config(&plan_path),
        registry(),
        modules(),
        Box::new(MemoryMultiStore::new()),
    )
    .expect("boot");
    assert_eq!(app.upgrade_state(), UpgradeState::PlanPending(100));

    // height 99: nothing has happened yet
    finalize(&mut app, 99);
    app.commit().expect("commit 99");
    assert!(!app.store().has_store("feegrant"));
    assert!(!app.store().has_store("feemarket"));
    assert_eq!(app.versions().get("feegrant"), None);

    // height 100: rewrite + migrations, plan consumed
    let response = finalize(&mut app, 100);
    app.commit().expect("commit 100");

    assert!(app.store().has_store("feegrant"));
    assert!(app.store().has_store("feemarket"));
    assert_eq!(app.versions().get("feegrant"), Some(1));
    assert_eq!(app.versions().get("feemarket"), Some(1));
    assert_eq!(app.upgrade_state(), UpgradeState::HandlerSucceeded);
    assert!(!plan_path.exists(), "plan cleared after success");

    // migrations ran against the freshly added stores
    assert_eq!(
        app.store().get("feegrant", b"schema").expect("get"),
        Some(b"0".to_vec())
    );

    let upgrade_events: Vec<_> = response
        .events
        .iter()
        .filter(|e| e.kind == "upgrade")
        .collect();
    assert_eq!(upgrade_events.len(), 1);
    assert!(upgrade_events[0]
        .attributes
        .contains(&("name".to_string(), "v0.7.0".to_string())));

    // restart with no plan file: no rewrite, versions survive
    let store = app.into_store();
    let mut app = App::load(&config(&plan_path), registry(), modules(), store).expect("reboot");
    assert_eq!(app.upgrade_state(), UpgradeState::NoPlan);
    assert_eq!(app.versions().get("feegrant"), Some(1));
    finalize(&mut app, 101);
    assert!(app.store().has_store("feegrant"));
}

#[test]
fn crash_replay_of_plan_height_does_not_double_apply() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan_path = dir.path().join("upgrade-info.json");
    let plan = PendingPlan {
        name: "v0.7.0".to_string(),
        height: 100,
    };
    write_plan(&plan_path, &plan).expect("write plan");

    let mut app = App::load(
        &config(&plan_path),
        registry(),
        modules(),
        Box::new(MemoryMultiStore::new()),
    )
    .expect("boot");
    finalize(&mut app, 100);

    // crash before the engine persisted anything: the plan file is back
    // and height 100 replays against the surviving store
    write_plan(&plan_path, &plan).expect("rewrite plan");
    let store = app.into_store();
    let mut app = App::load(&config(&plan_path), registry(), modules(), store)
        .expect("reboot into replay");

    // applied-marker keeps the rewrite out; the handler replay is a no-op
    // sweep because every module already sits at its code version
    finalize(&mut app, 100);
    assert!(app.store().has_store("feegrant"));
    assert_eq!(app.versions().get("feegrant"), Some(1));
    assert!(!plan_path.exists());
}

#[test]
fn dormant_plan_boots_and_runs_normally() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan_path = dir.path().join("upgrade-info.json");
    write_plan(
        &plan_path,
        &PendingPlan {
            name: "v2.0.0-future".to_string(),
            height: 100,
        },
    )
    .expect("write plan");

    let mut app = App::load(
        &config(&plan_path),
        registry(),
        modules(),
        Box::new(MemoryMultiStore::new()),
    )
    .expect("boot despite dormant plan");

    // the plan height passes without any upgrade activity
    finalize(&mut app, 100);
    assert!(!app.store().has_store("feegrant"));
    assert_eq!(app.versions().get("feegrant"), None);
    assert!(plan_path.exists(), "dormant plan is left in place");
}

#[test]
fn skip_height_suppresses_rewrite_but_not_migrations() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan_path = dir.path().join("upgrade-info.json");
    write_plan(
        &plan_path,
        &PendingPlan {
            name: "v0.7.0".to_string(),
            height: 50,
        },
    )
    .expect("write plan");

    let cfg = Config {
        skip_heights: Some(vec![50]),
        ..config(&plan_path)
    };
    // operator already recovered these stores by hand, hence the skip
    let mut store = MemoryMultiStore::new();
    store.add_store("feegrant").expect("add");
    store.add_store("feemarket").expect("add");

    let mut app = App::load(&cfg, registry(), modules(), Box::new(store)).expect("boot");
    finalize(&mut app, 50);

    assert_eq!(app.versions().get("feegrant"), Some(1));
    assert_eq!(app.upgrade_state(), UpgradeState::HandlerSucceeded);
    assert!(!plan_path.exists());
}
