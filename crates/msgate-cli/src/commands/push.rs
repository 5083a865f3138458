//! `msgate push` — deliver one message through the relay.

use crate::client::RelayClient;
use anyhow::Result;
use msgate_core::messages::{PushRequest, PushResponse, SessionType};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct PushArgs {
    pub send_id: String,
    pub recv_id: String,
    pub content: String,
    pub group: bool,
    pub content_type: i32,
}

pub async fn run(server: &str, args: PushArgs) -> Result<()> {
    let send_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();

    let req = PushRequest {
        operation_id: format!("cli-{send_time}"),
        send_id: args.send_id,
        recv_id: args.recv_id,
        session_type: if args.group {
            SessionType::Group
        } else {
            SessionType::Single
        },
        msg_from: 0,
        content_type: args.content_type,
        content: args.content,
        client_msg_id: String::new(),
        server_msg_id: String::new(),
        send_time,
        recv_seq: 0,
        sender_nick_name: String::new(),
        sender_face_url: String::new(),
        platform_id: 0,
    };

    let mut client = RelayClient::connect(server).await?;
    let resp = client.push_message(req).await?;
    print_results(&resp);
    Ok(())
}

pub fn print_results(resp: &PushResponse) {
    println!("{:<24} {:<10} {}", "RECIPIENT", "PLATFORM", "RESULT");
    for r in &resp.results {
        println!(
            "{:<24} {:<10} {}",
            r.recv_id,
            r.platform.name(),
            i64::from(r.result_code)
        );
    }
    if !resp.delivered_anywhere() {
        println!("(not delivered to any connection)");
    }
}
