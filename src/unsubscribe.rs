//! Unsubscribe job: each form response removes the matching contact, removes
//! the request itself, and records {timestamp, email} in the archive sheet.
//! Request rows are re-resolved by email before deletion so earlier removals
//! in the same pass cannot shift them.

use crate::api::Table;
use crate::rows::{data_rows, UnsubRequest, CONTACT_EMAIL_COL};
use anyhow::Result;
use tracing::{error, info, warn};

pub struct UnsubDeps<'a> {
    pub requests: &'a dyn Table,
    pub archive: &'a dyn Table,
    pub contacts: &'a dyn Table,
}

async fn process_request(deps: &UnsubDeps<'_>, request: &UnsubRequest, email_col: usize) -> Result<()> {
    let email = request.email.as_str();
    if deps.contacts.delete_row_by_key(CONTACT_EMAIL_COL, email).await? {
        info!("Removed {} from the contact list", email);
    } else {
        warn!("{} was not in the contact list", email);
    }

    if !deps.requests.delete_row_by_key(email_col, &request.raw).await? {
        warn!("Request row for {} already removed", email);
    }

    let today = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    deps.archive.append_row(&[today, email.to_string()]).await?;
    Ok(())
}

pub async fn run(deps: UnsubDeps<'_>) -> Result<bool> {
    info!("*********************PROCESSING UNSUBSCRIBE REQUESTS************************");

    let values = deps.requests.all_values().await?;
    let (header, rows) = data_rows(&values);
    let Some(email_col) = header.position("Email Address") else {
        error!("The unsubscribe sheet has no Email Address column");
        return Ok(false);
    };

    let requests: Vec<UnsubRequest> = rows
        .iter()
        .map(|(_, values)| UnsubRequest::from_values(&header, values))
        .filter(|request| !request.email.is_empty())
        .collect();

    for request in &requests {
        if let Err(err) = process_request(&deps, request, email_col).await {
            error!("Could not process unsubscribe for {}: {}", request.email, err);
        }
    }

    info!("*************************UNSUBSCRIBE REQUESTS PROCESSED*****************************");
    Ok(true)
}
