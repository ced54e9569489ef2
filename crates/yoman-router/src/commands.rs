//! The reserved `/` command surface.

use yoman_core::message::Reply;
use yoman_sessions::Session;
use yoman_users::User;

use crate::pipeline::{PhaseResult, Router};
use crate::replies;

/// Dispatch a slash command. Commands reset conversational state except
/// `/cancel`, which only aborts the in-progress flow (same destination,
/// different intent — a cancelled flow deserves an acknowledgement).
pub fn handle(router: &Router, user: &User, session: &mut Session, text: &str) -> PhaseResult {
    let command = text.split_whitespace().next().unwrap_or(text);
    match command {
        "/menu" => {
            router.sessions().reset(&user.id, session);
            Ok(Reply::text(replies::menu()))
        }
        "/cancel" => {
            let was_in_flow = session.state.in_flow();
            router.sessions().reset(&user.id, session);
            if was_in_flow {
                Ok(Reply::text(replies::cancelled()))
            } else {
                Ok(Reply::text(replies::menu()))
            }
        }
        "/help" => {
            router.sessions().reset(&user.id, session);
            Ok(Reply::text(replies::help(user.language)))
        }
        "/logout" => {
            router.sessions().reset(&user.id, session);
            router.deps.auth.logout(&user.phone);
            Ok(Reply::text(replies::logged_out()))
        }
        _ => Ok(Reply::text(replies::not_understood())),
    }
}
