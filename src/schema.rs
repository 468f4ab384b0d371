//! Diesel schema for the credential store.

diesel::table! {
    hosts (host) {
        host -> Text,
        user -> Text,
        pwd -> Text,
        enabled -> Integer,
    }
}
