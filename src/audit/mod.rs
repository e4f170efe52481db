pub mod audit_log;
pub mod audit_record;
