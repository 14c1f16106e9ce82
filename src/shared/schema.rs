diesel::table! {
    categories (id) {
        id -> Uuid,
        name -> Varchar,
        description -> Nullable<Text>,
        sla_hours -> Int4,
        active -> Bool,
        color -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    locations (id) {
        id -> Uuid,
        code -> Varchar,
        name -> Varchar,
        address -> Nullable<Text>,
        province -> Nullable<Varchar>,
        municipality -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        manager_name -> Nullable<Varchar>,
        manager_phone -> Nullable<Varchar>,
        active -> Bool,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        username -> Varchar,
        full_name -> Varchar,
        email -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        whatsapp -> Nullable<Varchar>,
        role -> Varchar,
        active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    user_specialties (user_id, category_id) {
        user_id -> Uuid,
        category_id -> Uuid,
    }
}

diesel::table! {
    tickets (id) {
        id -> Uuid,
        ticket_number -> Varchar,
        location_id -> Uuid,
        category_id -> Uuid,
        title -> Varchar,
        description -> Text,
        priority -> Varchar,
        status -> Varchar,
        created_by -> Uuid,
        assigned_to -> Nullable<Uuid>,
        created_at -> Timestamptz,
        assigned_at -> Nullable<Timestamptz>,
        work_started_at -> Nullable<Timestamptz>,
        resolved_at -> Nullable<Timestamptz>,
        closed_at -> Nullable<Timestamptz>,
        sla_deadline -> Timestamptz,
        resolution_notes -> Nullable<Text>,
        resolution_photo -> Nullable<Varchar>,
        sla_deadline_notified -> Bool,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_comments (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        author_id -> Uuid,
        body -> Text,
        internal -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    notification_devices (id) {
        id -> Uuid,
        user_id -> Uuid,
        push_token -> Varchar,
        active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(tickets -> locations (location_id));
diesel::joinable!(tickets -> categories (category_id));
diesel::joinable!(ticket_comments -> tickets (ticket_id));
diesel::joinable!(ticket_comments -> users (author_id));
diesel::joinable!(user_specialties -> users (user_id));
diesel::joinable!(user_specialties -> categories (category_id));
diesel::joinable!(notification_devices -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    categories,
    locations,
    users,
    user_specialties,
    tickets,
    ticket_comments,
    notification_devices,
);
