mod edit_session;
mod end_to_end;
