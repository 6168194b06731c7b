mod day;
mod entry;
mod helpers;
mod limit;
mod suggest;

pub(crate) use day::{cmd_day, cmd_list};
pub(crate) use entry::{EntryEdit, cmd_add, cmd_delete, cmd_edit, cmd_show};
pub(crate) use limit::cmd_limit;
pub(crate) use suggest::cmd_suggest;
