//! Matrix-wide result-shape classification.

use crate::case::{Case, CommandSpec, ResultShape};
use crate::executor::ExecutionRecord;
use crate::report::FailureReason;

/// Whether an execution contributes a non-empty result: both sides
/// succeeded and at least one reply is meaningful for the command.
pub fn contributes_non_empty(command: &CommandSpec, record: &ExecutionRecord) -> bool {
    match (record.sut.success(), record.reference.success()) {
        (Some(sut), Some(reference)) => command.is_meaningful(sut) || command.is_meaningful(reference),
        _ => false,
    }
}

/// Check the case's expected shape against the pairings that contributed a
/// non-empty result. `NonEmpty` is not enforced for known-divergent cases.
pub fn classify(case: &Case, non_empty_pairings: &[String]) -> Option<FailureReason> {
    let violated = match case.expected_shape() {
        ResultShape::NonEmpty => !case.is_known_divergent() && non_empty_pairings.is_empty(),
        ResultShape::Empty => !non_empty_pairings.is_empty(),
    };
    violated.then(|| FailureReason::ShapeViolation {
        expected: case.expected_shape(),
        non_empty_pairings: non_empty_pairings.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::CommandError;
    use crate::executor::Outcome;
    use docparity_error::ErrorCode;
    use docparity_types::{Document, Value, array, doc};

    fn record(sut: Outcome, reference: Outcome) -> ExecutionRecord {
        ExecutionRecord {
            pairing: "p".to_owned(),
            sut,
            reference,
            elapsed: Duration::ZERO,
        }
    }

    fn failure() -> Outcome {
        Outcome::Failure(CommandError::new(ErrorCode::BadValue, "x"))
    }

    fn count_case(shape: ResultShape) -> Case {
        Case::count("c").filter(Document::new()).expect(shape).build().unwrap()
    }

    #[test]
    fn count_success_on_both_sides_is_non_empty() {
        let case = count_case(ResultShape::NonEmpty);
        let n0 = Outcome::Success(doc! { "n" => 0_i32, "ok" => 1.0 });
        assert!(contributes_non_empty(case.command(), &record(n0.clone(), n0.clone())));
        assert!(!contributes_non_empty(case.command(), &record(n0.clone(), failure())));
        assert!(!contributes_non_empty(case.command(), &record(failure(), n0)));
    }

    #[test]
    fn find_needs_a_document_in_the_batch() {
        let case = Case::find("f").filter(Document::new()).build().unwrap();
        let empty = Outcome::Success(doc! { "cursor" => doc! { "firstBatch" => Value::Array(vec![]) } });
        let full = Outcome::Success(doc! { "cursor" => doc! { "firstBatch" => array![doc! { "_id" => 1_i32 }] } });
        assert!(!contributes_non_empty(case.command(), &record(empty.clone(), empty.clone())));
        assert!(contributes_non_empty(case.command(), &record(empty, full)));
    }

    #[test]
    fn non_empty_needs_one_pairing() {
        let case = count_case(ResultShape::NonEmpty);
        assert!(classify(&case, &["Strings".to_owned()]).is_none());
        assert!(matches!(
            classify(&case, &[]),
            Some(FailureReason::ShapeViolation { expected: ResultShape::NonEmpty, .. })
        ));
    }

    #[test]
    fn non_empty_skipped_for_known_divergence() {
        let case = Case::count("d")
            .filter(Document::new())
            .known_divergent("org/repo#9")
            .build()
            .unwrap();
        assert!(classify(&case, &[]).is_none());
    }

    #[test]
    fn empty_rejects_any_non_empty_pairing() {
        let case = count_case(ResultShape::Empty);
        assert!(classify(&case, &[]).is_none());
        let violation = classify(&case, &["Int32s".to_owned()]).unwrap();
        assert_eq!(
            violation,
            FailureReason::ShapeViolation {
                expected: ResultShape::Empty,
                non_empty_pairings: vec!["Int32s".to_owned()],
            }
        );
    }
}
