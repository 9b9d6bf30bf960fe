//! Property tests for phone normalization

use aisha_backend::phone::NumberingPlan;
use proptest::prelude::*;

fn subscriber() -> impl Strategy<Value = String> {
    "[1-9][0-9]{8}"
}

proptest! {
    #[test]
    fn all_input_shapes_agree(sub in subscriber()) {
        let plan = NumberingPlan::kenya();
        let local = plan.normalize(&format!("0{sub}")).unwrap();
        let with_code = plan.normalize(&format!("254{sub}")).unwrap();
        let international = plan.normalize(&format!("+254{sub}")).unwrap();

        prop_assert_eq!(local.as_str(), format!("+254{sub}"));
        prop_assert_eq!(&local, &with_code);
        prop_assert_eq!(&local, &international);
    }

    #[test]
    fn normalizing_is_idempotent(sub in subscriber()) {
        let plan = NumberingPlan::kenya();
        let once = plan.normalize(&format!("0{sub}")).unwrap();
        let twice = plan.normalize(once.as_str()).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert!(plan.is_canonical(once.as_str()));
    }

    #[test]
    fn separators_do_not_matter(
        sub in subscriber(),
        sep in prop::sample::select(vec![" ", "-", ".", " - "])
    ) {
        let plan = NumberingPlan::kenya();
        let spaced = format!("0{}{sep}{}{sep}{}", &sub[..3], &sub[3..6], &sub[6..]);
        let phone = plan.normalize(&spaced).unwrap();
        prop_assert_eq!(phone.as_str(), format!("+254{sub}"));
    }

    #[test]
    fn letters_are_never_accepted(sub in subscriber(), at in 0usize..9, letter in "[a-zA-Z]") {
        let plan = NumberingPlan::kenya();
        let mut raw = format!("0{sub}");
        raw.replace_range(at + 1..at + 2, &letter);
        prop_assert!(plan.normalize(&raw).is_err());
    }

    #[test]
    fn wrong_lengths_are_rejected(digits in "[0-9]{1,8}|[0-9]{13,16}") {
        let plan = NumberingPlan::kenya();
        prop_assert!(plan.normalize(&digits).is_err());
    }
}
