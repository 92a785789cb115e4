pub mod push_routes;
