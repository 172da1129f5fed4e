table! {
    platform_action_log (id) {
        id -> Integer,
        user_id -> Integer,
        platform -> Text,
        action -> Text,
        metadata -> Text,
        created_at -> Timestamp,
    }
}

table! {
    platform_credential (id) {
        id -> Integer,
        user_id -> Integer,
        platform -> Text,
        access_token -> Text,
        refresh_token -> Nullable<Text>,
        expiry_date -> Nullable<Timestamp>,
        scope -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    track (id) {
        id -> Integer,
        title -> Text,
        artist -> Text,
        album -> Nullable<Text>,
        duration_ms -> Nullable<Integer>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    track_platform_info (id) {
        id -> Integer,
        track_id -> Integer,
        platform -> Text,
        platform_id -> Text,
        url -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    user (id) {
        id -> Integer,
        name -> Text,
        hash -> Binary,
        salt -> Binary,
    }
}

table! {
    user_saved_track (id) {
        id -> Integer,
        user_id -> Integer,
        track_id -> Integer,
        platform -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

joinable!(platform_action_log -> user (user_id));
joinable!(platform_credential -> user (user_id));
joinable!(track_platform_info -> track (track_id));
joinable!(user_saved_track -> track (track_id));
joinable!(user_saved_track -> user (user_id));

allow_tables_to_appear_in_same_query!(
    platform_action_log,
    platform_credential,
    track,
    track_platform_info,
    user,
    user_saved_track,
);
