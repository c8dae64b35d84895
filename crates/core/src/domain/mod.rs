pub mod picklist;
pub mod record;
