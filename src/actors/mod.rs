pub mod tour;
pub mod tour_socket;
pub mod ws_server;
