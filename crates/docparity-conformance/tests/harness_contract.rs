//! End-to-end behavior of the harness over the in-memory deployment.

use std::sync::Arc;
use std::time::Duration;

use docparity_conformance::{CompatSetup, FaultSpec, FaultyHandle, StalledHandle};
use docparity_harness::{
    AbortReason, BackendSide, Case, CaseTable, CaseVerdict, CollectionHandle, HarnessError, RunnerConfig,
};
use docparity_memdb::{Deployment, Quirk, QuirkSet, SetupOpts, catalog};
use docparity_types::{Document, doc};

fn table() -> CaseTable {
    CaseTable::build(
        "contract",
        [
            Case::count("All").filter(Document::new()),
            Case::count("Skipped").filter(Document::new()).skip(1_i32),
            Case::count("FractionalSkip")
                .filter(Document::new())
                .skip(1.5)
                .known_divergent(Quirk::RejectFractionalSkip.issue()),
            Case::find("Arrays").filter(doc! { "v" => doc! { "$type" => "array" } }),
            Case::find("NoMatch")
                .filter(doc! { "_id" => "missing" })
                .expect_empty(),
        ],
    )
    .unwrap()
}

#[test]
fn fixed_quirk_turns_tracked_case_into_anomaly() {
    let config = RunnerConfig::default();
    let opts = SetupOpts {
        sut_quirks: QuirkSet::none(),
        ..SetupOpts::default()
    };
    let setup = CompatSetup::new("contract", &opts, &config).unwrap();
    let report = setup.run(&table(), &config).unwrap();

    assert!(!report.is_green());
    assert!(matches!(report.verdict("FractionalSkip"), Some(CaseVerdict::Anomaly { .. })));
    assert_eq!(report.summary.anomalies, 1);
    assert_eq!(report.quirks().summary().stale, 1);
    assert!(report.render_text().contains("remove annotation"));
}

#[test]
fn quirk_fixed_on_one_pairing_is_flagged_there() {
    let config = RunnerConfig::default();
    let fixed = Deployment::setup(
        catalog(),
        &SetupOpts {
            sut_quirks: QuirkSet::none(),
            ..SetupOpts::default()
        },
    )
    .unwrap();
    let setup = CompatSetup::wrapped("contract", &SetupOpts::default(), &config, |name, handle| {
        if name == "Strings" {
            Arc::new(fixed.sut().collection(name)) as Arc<dyn CollectionHandle>
        } else {
            handle
        }
    })
    .unwrap();
    let report = setup.run(&table(), &config).unwrap();

    assert!(report.is_green(), "{}", report.render_text());
    let case = report.case("FractionalSkip").unwrap();
    assert!(matches!(case.verdict, CaseVerdict::ExpectedFail { .. }));
    assert_eq!(case.stale_pairings().collect::<Vec<_>>(), vec!["Strings"]);
    assert!(report.render_text().contains("fixed on: Strings"));
    assert_eq!(report.case("All").unwrap().stale_pairings().count(), 0);
}

#[test]
fn transport_fault_aborts_only_affected_cases() {
    let config = RunnerConfig::default();
    let faulty = parking_lot::Mutex::new(None);
    let setup = CompatSetup::wrapped("contract", &SetupOpts::default(), &config, |name, handle| {
        if name != "Strings" {
            return handle;
        }
        let wrapped = Arc::new(FaultyHandle::new(handle, FaultSpec::WhenField("skip".to_owned())));
        *faulty.lock() = Some(Arc::clone(&wrapped));
        wrapped as Arc<dyn CollectionHandle>
    })
    .unwrap();
    let report = setup.run(&table(), &config).unwrap();

    for name in ["Skipped", "FractionalSkip"] {
        assert_eq!(
            report.verdict(name),
            Some(&CaseVerdict::Aborted {
                reason: AbortReason::Transport {
                    pairing: "Strings".to_owned(),
                    side: BackendSide::Sut,
                    detail: "connection reset by peer".to_owned(),
                },
            }),
            "{name}"
        );
    }
    assert_eq!(report.verdict("All"), Some(&CaseVerdict::Pass));
    assert_eq!(report.verdict("NoMatch"), Some(&CaseVerdict::Pass));
    assert_eq!(report.transport_failures().count(), 2);
    assert!(faulty.lock().as_ref().is_some_and(|h| h.injected() >= 2));

    let err = report.into_result().unwrap_err();
    assert!(matches!(err, HarnessError::Transport { ref pairing, .. } if pairing == "Strings"));
}

#[test]
fn stalled_backend_hits_group_deadline() {
    let config = RunnerConfig {
        global_timeout: Duration::from_millis(150),
        ..RunnerConfig::default()
    };
    let setup = CompatSetup::wrapped("contract", &SetupOpts::default(), &config, |name, _| {
        Arc::new(StalledHandle::new(name)) as Arc<dyn CollectionHandle>
    })
    .unwrap();
    let report = setup.run(&table(), &config).unwrap();

    assert_eq!(report.summary.aborted, report.summary.total);
    assert!(report
        .cases
        .iter()
        .all(|c| c.verdict == CaseVerdict::Aborted { reason: AbortReason::Deadline }));
    assert!(report.into_result().is_ok());
}

#[test]
fn json_report_round_trips_through_disk() {
    let config = RunnerConfig::default();
    let setup = CompatSetup::new("contract", &SetupOpts::default(), &config).unwrap();
    let report = setup.run(&table(), &config).unwrap();
    assert!(report.is_green(), "{}", report.render_text());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contract.json");
    report.write_json(&path).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["group"], "contract");
    assert_eq!(json["fingerprint"], report.fingerprint.as_str());
    assert_eq!(json["summary"]["total"], 5);
    assert_eq!(json["summary"]["expected_failures"], 1);
    let names: Vec<&str> = json["cases"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["case"].as_str())
        .collect();
    assert_eq!(names, ["All", "Skipped", "FractionalSkip", "Arrays", "NoMatch"]);
    assert_eq!(json["cases"][2]["verdict"]["verdict"], "expected_fail");
}

#[test]
fn sequential_and_concurrent_runs_agree() {
    let concurrent = RunnerConfig::default();
    let sequential = RunnerConfig::from_lookup(|key| match key {
        "DOCPARITY_SEQUENTIAL_CALLS" => Some("1".to_owned()),
        "DOCPARITY_CASE_WORKERS" | "DOCPARITY_EXECUTION_WORKERS" => Some("1".to_owned()),
        _ => None,
    })
    .unwrap();
    assert!(!sequential.concurrent_calls);

    let setup = CompatSetup::new("contract", &SetupOpts::default(), &concurrent).unwrap();
    let a = setup.run(&table(), &concurrent).unwrap();
    let b = setup.run(&table(), &sequential).unwrap();

    let verdicts = |r: &docparity_harness::GroupReport| {
        r.cases
            .iter()
            .map(|c| (c.case.clone(), c.verdict.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(verdicts(&a), verdicts(&b));
    assert_eq!(a.fingerprint, b.fingerprint);
}

#[test]
fn fingerprint_tracks_case_content() {
    let config = RunnerConfig::default();
    let setup = CompatSetup::new("contract", &SetupOpts::default(), &config).unwrap();
    let report = setup.run(&table(), &config).unwrap();
    assert_eq!(report.fingerprint, table().fingerprint());

    let changed = CaseTable::build("contract", [Case::count("All").filter(Document::new()).skip(2_i32)]).unwrap();
    assert_ne!(changed.fingerprint(), table().fingerprint());
}

#[test]
fn matrix_without_nonexistent_pairing_is_rejected() {
    let opts = SetupOpts {
        add_nonexistent_collection: false,
        ..SetupOpts::default()
    };
    let err = CompatSetup::new("contract", &opts, &RunnerConfig::default()).unwrap_err();
    assert!(matches!(err, HarnessError::MissingNonexistentPairing { .. }));
    assert!(err.is_configuration());
    assert_eq!(
        err.suggestion(),
        Some("Enable the nonexistent-collection pairing during setup")
    );
}
