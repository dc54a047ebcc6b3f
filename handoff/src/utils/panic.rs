use crate::error::ContractPanic;
use std::any::Any;

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(violation) = payload.downcast_ref::<ContractPanic>() {
        violation.to_string()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PanicReason;
    use rstest::rstest;
    use std::panic::Location;

    #[rstest]
    #[case::str(Box::new("static"), "static")]
    #[case::string(Box::new(String::from("owned")), "owned")]
    #[case::other(Box::new(42u32), "non-string panic payload")]
    fn test_panic_message(#[case] payload: Box<dyn Any + Send>, #[case] expected: &str) {
        assert_eq!(panic_message(&*payload), expected);
    }

    #[test]
    fn test_panic_message_contract() {
        let payload: Box<dyn Any + Send> = Box::new(ContractPanic {
            reason: PanicReason::StaleTask,
            msg: "gone".to_string(),
            location: Location::caller(),
        });

        assert!(panic_message(&*payload).contains("StaleTask"));
    }
}
