pub mod agent_loop;
pub mod apply;
pub mod boot;
pub mod cache;
pub mod cli;
pub mod node_annotator;
pub mod reboot_handler;
pub mod system_reboot;
pub mod system_service_manager;
