use docparity_conformance::{assert_expected_fail, assert_green, run_suite};
use docparity_harness::{Case, CaseBuilder, CaseTable, CaseVerdict, Cx, ProviderCatalog};
use docparity_memdb::{Deployment, MemoryStore, Quirk, SetupOpts, catalog};
use docparity_types::{Document, ObjectId, Value, doc};

fn strings_len() -> i64 {
    let len = catalog()
        .provider("Strings")
        .map(|p| p.documents().len())
        .expect("Strings provider");
    i64::try_from(len).unwrap()
}

fn cases() -> Vec<CaseBuilder> {
    let len = strings_len();
    let skip_len = |delta: i64| Value::from(len + delta);
    vec![
        Case::count("Empty").filter(Document::new()).skip(0_i32),
        Case::count("IDString").filter(doc! { "_id" => "string" }).skip(0_i32),
        Case::count("IDObjectID").filter(doc! { "_id" => ObjectId::NIL }).skip(0_i32),
        Case::count("IDNotExists")
            .filter(doc! { "_id" => "count-id-not-exists" })
            .skip(0_i32),
        Case::count("IDBool").filter(doc! { "_id" => "bool-true" }).skip(0_i32),
        Case::count("FieldTrue").filter(doc! { "v" => true }).skip(0_i32),
        Case::count("FieldTypeArrays")
            .filter(doc! { "v" => doc! { "$type" => "array" } })
            .skip(0_i32),
        Case::count("LimitAlmostAll").filter(Document::new()).skip(Value::Null).limit(len - 1),
        Case::count("LimitAll").filter(Document::new()).skip(Value::Null).limit(len),
        Case::count("LimitMore").filter(Document::new()).skip(Value::Null).limit(len + 1),
        Case::count("SkipSimple").filter(Document::new()).skip(1_i32),
        Case::count("SkipAlmostAll").filter(Document::new()).skip(skip_len(-1)),
        Case::count("SkipAll").filter(Document::new()).skip(skip_len(0)),
        Case::count("SkipMore").filter(Document::new()).skip(skip_len(1)),
        Case::count("SkipBig").filter(Document::new()).skip(1000_i32),
        Case::count("SkipDouble")
            .filter(Document::new())
            .skip(1.111)
            .known_divergent(Quirk::RejectFractionalSkip.issue()),
        Case::count("SkipNegative").filter(Document::new()).skip(-1_i32).expect_empty(),
        Case::count("SkipNegativeDouble").filter(Document::new()).skip(-1.111).expect_empty(),
        Case::count("SkipNegativeDoubleCeil").filter(Document::new()).skip(-1.888).expect_empty(),
        Case::count("SkipMinFloat").filter(Document::new()).skip(-f64::MAX).expect_empty(),
        Case::count("SkipNull").filter(Document::new()).skip(Value::Null),
        Case::count("SkipString").filter(Document::new()).skip("foo").expect_empty(),
    ]
}

#[test]
fn count_compat() {
    let table = CaseTable::build("count", cases()).unwrap();
    let report = run_suite(&table).unwrap();

    assert_green(&report);
    assert_eq!(report.summary.total, table.len());
    assert_expected_fail(&report, "SkipDouble");
    assert_eq!(report.summary.expected_failures, 1);
    assert_eq!(report.summary.passed, table.len() - 1);
}

#[test]
fn tracked_skip_divergence_reports_both_sides() {
    let table = CaseTable::build(
        "count-skip-double",
        [Case::count("SkipDouble")
            .filter(Document::new())
            .skip(1.111)
            .known_divergent(Quirk::RejectFractionalSkip.issue())],
    )
    .unwrap();
    let report = run_suite(&table).unwrap();
    let Some(CaseVerdict::ExpectedFail { issue, reasons }) = report.verdict("SkipDouble") else {
        panic!("{}", report.render_text());
    };
    assert_eq!(issue.as_str(), Quirk::RejectFractionalSkip.issue());
    // Every pairing diverges, the nonexistent one included.
    assert_eq!(reasons.len(), catalog().list_providers().len() + 1);
    assert_eq!(report.quirks().summary().active, 1);
}

#[test]
fn skip_boundaries_hold_on_strings() {
    let deployment = Deployment::setup(catalog(), &SetupOpts::default()).unwrap();
    let len = strings_len();
    let count = |store: &MemoryStore, skip: Option<Value>| {
        let mut command = doc! { "count" => "Strings", "query" => Document::new() };
        if let Some(skip) = skip {
            command.insert("skip", skip);
        }
        let reply = store.run_command(&Cx::new(), &command).unwrap();
        reply.get("n").and_then(Value::as_i64).unwrap()
    };

    for store in [deployment.sut(), deployment.reference()] {
        let label = store.dialect().label();
        assert_eq!(count(store, None), len, "{label}");
        assert_eq!(count(store, Some(Value::from(0_i32))), count(store, None), "{label}");
        assert_eq!(count(store, Some(Value::Null)), count(store, None), "{label}");
        assert_eq!(count(store, Some(Value::from(len - 1))), 1, "{label}");
        assert_eq!(count(store, Some(Value::from(len))), 0, "{label}");
        assert_eq!(count(store, Some(Value::from(len + 1))), 0, "{label}");
    }
}
