//! `msgate online` — query which platforms users are connected on.

use crate::client::RelayClient;
use anyhow::Result;

pub async fn run(server: &str, user_ids: Vec<String>) -> Result<()> {
    let mut client = RelayClient::connect(server).await?;
    let resp = client.get_online_status(user_ids.clone()).await?;

    for user in &user_ids {
        match resp.users.iter().find(|u| &u.user_id == user) {
            Some(status) => {
                let platforms: Vec<&str> = status
                    .platforms
                    .iter()
                    .filter(|p| p.online)
                    .map(|p| p.platform.name())
                    .collect();
                println!("{user}: online ({})", platforms.join(", "));
            }
            None => println!("{user}: offline"),
        }
    }
    Ok(())
}
