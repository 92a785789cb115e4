pub mod compact_id;
