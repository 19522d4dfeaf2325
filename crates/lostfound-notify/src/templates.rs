//! Message templates.

use lostfound_core::{Item, ItemType};

use crate::mailer::EmailMessage;

/// Receipt sent to the submitter when a report is stored.
pub fn submission_received(item: &Item) -> EmailMessage {
    EmailMessage::new(
        &item.user_email,
        "Lost & Found Submission Received",
        format!(
            "Hi {},\n\n\
             We've received your {} item submission: \"{}\" at {}.\n\
             You'll be notified once it is reviewed.\n\n\
             Thanks,\n\
             Lost & Found Team\n",
            item.submitted_by, item.item_type, item.title, item.location
        ),
    )
}

/// Alert to the owner of a `candidate_type` report that `trigger` may match it.
pub fn possible_match(recipient: &str, trigger: &Item, candidate_type: ItemType) -> EmailMessage {
    EmailMessage::new(
        recipient,
        "🔔 Possible Match Found for Your Item!",
        format!(
            "Hi there,\n\n\
             We've found an item titled \"{}\" in \"{}\" that may match something you reported as {}.\n\n\
             Please visit the Lost & Found portal to verify the details.\n\n\
             Thanks,\n\
             Lost & Found Team\n",
            trigger.title, trigger.location, candidate_type
        ),
    )
}

/// Tells the submitter that security has their item.
pub fn found_by_security(item: &Item) -> EmailMessage {
    EmailMessage::new(
        &item.user_email,
        "Your Lost Item Was Found!",
        format!(
            "Hi {},\n\n\
             Good news! The item you reported as lost (\"{}\") has been found and is now available at the security office.\n\n\
             Please visit the security desk to collect your item.\n\n\
             Thanks,\n\
             Lost & Found Team",
            item.submitted_by, item.title
        ),
    )
}

/// Confirmation sent to a claimant.
pub fn claim_received(name: &str, email: &str, item: &Item) -> EmailMessage {
    EmailMessage::new(
        email,
        "Claim Request Submitted",
        format!(
            "Hi {},\n\n\
             Your claim for the item \"{}\" has been received.\n\
             Please visit the security office to complete the collection process.\n\n\
             Thanks,\n\
             Lost & Found Team\n",
            name, item.title
        ),
    )
}

/// One-time login code.
pub fn otp_code(email: &str, code: &str, valid_minutes: i64) -> EmailMessage {
    EmailMessage::new(
        email,
        "🔐 Your OTP for Login",
        format!(
            "Your OTP is: {}\nIt is valid for {} minutes.",
            code, valid_minutes
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lostfound_core::ItemSubmission;
    use uuid::Uuid;

    fn item() -> Item {
        ItemSubmission {
            title: Some("Silver watch".to_string()),
            description: Some("Leather strap".to_string()),
            item_type: Some("lost".to_string()),
            location: Some("Gym".to_string()),
            submitted_by: Some("Noor".to_string()),
            user_email: Some("noor@x.edu".to_string()),
            ..Default::default()
        }
        .validate(Vec::new(), Utc::now())
        .unwrap()
        .into_item(Uuid::nil(), Utc::now())
    }

    #[test]
    fn test_submission_received() {
        let msg = submission_received(&item());
        assert_eq!(msg.to, "noor@x.edu");
        assert!(msg
            .body
            .contains("your lost item submission: \"Silver watch\" at Gym"));
    }

    #[test]
    fn test_possible_match_names_candidate_kind() {
        let msg = possible_match("finder@x.edu", &item(), ItemType::Found);
        assert_eq!(msg.subject, "🔔 Possible Match Found for Your Item!");
        assert!(msg.body.contains("\"Silver watch\" in \"Gym\""));
        assert!(msg.body.contains("reported as found."));
    }

    #[test]
    fn test_otp_code() {
        let msg = otp_code("s@x.edu", "493021", 5);
        assert_eq!(msg.body, "Your OTP is: 493021\nIt is valid for 5 minutes.");
    }
}
