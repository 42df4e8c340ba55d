// Typed views of the tables created by `SQLikeMigrations`; bookkeeping
// columns filled by database defaults are left out.

diesel::table! {
    kong_withdrawal_queues (chain_id, vault, position) {
        chain_id -> Int8,
        vault -> VarChar,
        position -> Int4,
        strategy -> VarChar,
        as_of_block -> Int8,
    }
}

diesel::table! {
    kong_snapshots (chain_id, address) {
        chain_id -> Int8,
        address -> VarChar,
        block_number -> Int8,
        block_time -> Int8,
        snapshot -> Jsonb,
        hook -> Jsonb,
    }
}

diesel::table! {
    kong_outputs (chain_id, address, label, component, series_time) {
        chain_id -> Int8,
        address -> VarChar,
        label -> VarChar,
        component -> VarChar,
        value -> Nullable<Float8>,
        block_number -> Int8,
        block_time -> Int8,
        series_time -> Int8,
    }
}

diesel::table! {
    kong_evmlogs (chain_id, address, block_number, log_index, transaction_hash) {
        chain_id -> Int8,
        address -> VarChar,
        event_name -> VarChar,
        signature -> VarChar,
        args -> Jsonb,
        block_number -> Int8,
        block_hash -> VarChar,
        block_time -> Int8,
        log_index -> Int8,
        transaction_hash -> VarChar,
        transaction_index -> Int8,
    }
}

diesel::table! {
    kong_strides (chain_id, address) {
        chain_id -> Int8,
        address -> VarChar,
        strides -> Text,
    }
}
