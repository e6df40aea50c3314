//! Template contexts for the letter and the email body.

use chrono::{DateTime, Utc};

use super::Context;
use crate::model::letter::{format_timestamp, Letter};
use crate::model::postal::{Party, PostalInfo};

/// Values for the letter template, taken from the frozen postal snapshot.
pub fn letter_context(
    name: &str,
    contents: &str,
    postal: &PostalInfo,
    letter_date: &str,
) -> Context {
    let mut ctx = Context::new();
    ctx.insert("letter_name", name.to_string());
    ctx.insert("letter_date", letter_date.to_string());
    ctx.insert("letter_contents", contents.trim_end().to_string());
    insert_party(&mut ctx, &postal.sender, PARTY_KEYS_SENDER);
    insert_party(&mut ctx, &postal.recipient, PARTY_KEYS_RECIPIENT);
    ctx
}

/// Values for the email body template.
pub fn email_body_context(letter: &Letter, sent_at: DateTime<Utc>) -> Context {
    let mut ctx = Context::new();
    ctx.insert("recipient_name", letter.postal_info.recipient.name.clone());
    ctx.insert("letter_name", letter.name.clone());
    ctx.insert("created_date", format_timestamp(letter.creation_time));
    ctx.insert("received_date", format_timestamp(letter.received_time));
    ctx.insert(
        "scheduled_delivery",
        format_timestamp(letter.scheduled_delivery_time),
    );
    ctx.insert("sent_date", format_timestamp(sent_at));
    ctx
}

/// Keys in field order: name, address_line1, address_line2, zip, city_state, country, phone, email.
type PartyKeys = [&'static str; 8];

const PARTY_KEYS_SENDER: PartyKeys = [
    "sender_name",
    "sender_address_line1",
    "sender_address_line2",
    "sender_zip",
    "sender_city_state",
    "sender_country",
    "sender_phone",
    "sender_email",
];

const PARTY_KEYS_RECIPIENT: PartyKeys = [
    "recipient_name",
    "recipient_address_line1",
    "recipient_address_line2",
    "recipient_zip",
    "recipient_city_state",
    "recipient_country",
    "recipient_phone",
    "recipient_email",
];

fn insert_party(ctx: &mut Context, party: &Party, keys: PartyKeys) {
    let values = [
        &party.name,
        &party.address_line1,
        &party.address_line2,
        &party.zip,
        &party.city_state,
        &party.country,
        &party.phone,
        &party.email,
    ];
    for (key, value) in keys.into_iter().zip(values) {
        ctx.insert(key, value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::letter::LetterStatus;
    use crate::render::{Renderer, Templates, EMAIL_BODY_TEMPLATE, LETTER_TEMPLATE};
    use chrono::TimeZone;

    fn postal() -> PostalInfo {
        PostalInfo {
            sender: Party {
                name: "Ana Pérez".into(),
                city_state: "Santiago, RM".into(),
                ..Party::default()
            },
            recipient: Party {
                name: "Luis Soto".into(),
                country: "Chile".into(),
                email: "luis@example.com".into(),
                ..Party::default()
            },
        }
    }

    #[test]
    fn test_letter_context_keys() {
        let ctx = letter_context("2025-09-01", "Hola\n\n", &postal(), "2025-09-01");
        assert_eq!(ctx["sender_name"], "Ana Pérez");
        assert_eq!(ctx["sender_city_state"], "Santiago, RM");
        assert_eq!(ctx["recipient_country"], "Chile");
        assert_eq!(ctx["recipient_phone"], "");
        assert_eq!(ctx["letter_contents"], "Hola");
    }

    #[test]
    fn test_rendered_letter_contains_snapshot() {
        let html = Templates::builtin()
            .render(
                LETTER_TEMPLATE,
                &letter_context("carta", "Querido Luis,", &postal(), "2025-09-01"),
            )
            .unwrap();
        assert!(html.contains("Ana Pérez"));
        assert!(html.contains("Luis Soto"));
        assert!(html.contains("Querido Luis,"));
        assert!(html.contains("2025-09-01"));
    }

    #[test]
    fn test_email_body_has_all_dates() {
        let t = |d: u32, h: u32| Utc.with_ymd_and_hms(2025, 9, d, h, 0, 0).unwrap();
        let letter = Letter {
            id: "x".into(),
            name: "carta".into(),
            creation_time: t(1, 9),
            contents: String::new(),
            rendered_html: None,
            postal_info: postal(),
            received_time: t(1, 10),
            scheduled_delivery_time: t(2, 8),
            delivery_time: None,
            status: LetterStatus::InTransit,
        };
        let html = Templates::builtin()
            .render(EMAIL_BODY_TEMPLATE, &email_body_context(&letter, t(2, 9)))
            .unwrap();
        for expected in [
            "Luis Soto",
            "2025-09-01 09:00:00",
            "2025-09-01 10:00:00",
            "2025-09-02 08:00:00",
            "2025-09-02 09:00:00",
        ] {
            assert!(html.contains(expected), "missing {expected}");
        }
    }
}
