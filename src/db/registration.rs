//! Registration: create a team with its first members, or join an existing team.
//!
//! Checks run in a fixed order (structure, duplicates, mode, capacity) and everything
//! after the structural pass happens inside one transaction. Either every member is
//! persisted or none is.

use std::collections::HashSet;

use super::members::{capacity_snapshot, duplicate_person, insert_member};
use super::repository::*;
use super::teams::{duplicate_team, insert_team, team_name_taken};
use crate::auth;
use crate::capacity::check_capacity;
use crate::errors::AppError;
use crate::models::{
    validate_team_name, validate_team_password, NewMember, RegisteredTeam, Registration,
    RegistrationRequest,
};

/// Structural pass: per-member field checks and no person listed twice.
fn validate_members(members: &[NewMember]) -> Result<Vec<NewMember>, AppError> {
    if members.is_empty() {
        return Err(AppError::Validation(
            "At least one member is required".to_string(),
        ));
    }

    let validated = members
        .iter()
        .map(NewMember::validated)
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen = HashSet::new();
    for member in &validated {
        let key = (
            member.first_name.to_lowercase(),
            member.last_name.to_lowercase(),
        );
        if !seen.insert(key) {
            return Err(AppError::Validation(format!(
                "{} {} is listed more than once",
                member.first_name, member.last_name
            )));
        }
    }

    Ok(validated)
}

impl Repository {
    pub async fn register(&self, request: &RegistrationRequest) -> Result<Registration, AppError> {
        let members = validate_members(request.members())?;
        let new_team_name = match request {
            RegistrationRequest::Create { team_name, .. } => Some(validate_team_name(team_name)?),
            RegistrationRequest::Join { .. } => None,
        };

        // Hashing is slow, keep it outside the transaction
        let new_team_hash = match request {
            RegistrationRequest::Create { team_password, .. }
                if validate_team_password(team_password).is_ok() =>
            {
                Some(self.hash_team_password(team_password)?)
            }
            _ => None,
        };

        let mut tx = self.pool.begin().await?;

        for member in &members {
            if person_exists(&mut tx, &member.first_name, &member.last_name, None).await? {
                return Err(duplicate_person(&member.first_name, &member.last_name));
            }
        }

        let incoming = members.len() as i64;
        let registered = match request {
            RegistrationRequest::Create {
                team_description,
                team_password,
                ..
            } => {
                validate_team_password(team_password)?;
                let name = new_team_name.unwrap_or_default();
                if team_name_taken(&mut tx, &name, None).await? {
                    return Err(duplicate_team(&name));
                }
                if !members.iter().any(|m| m.is_leader) {
                    return Err(AppError::Validation(
                        "A new team needs at least one leader".to_string(),
                    ));
                }
                let min_team_size = load_settings(&mut tx).await?.min_team_size;
                if incoming < min_team_size {
                    return Err(AppError::Validation(format!(
                        "A new team needs at least {} members, got {}",
                        min_team_size, incoming
                    )));
                }

                let snapshot = capacity_snapshot(&mut tx, None).await?;
                check_capacity(&snapshot, incoming)?;

                let password_hash = new_team_hash.unwrap_or_default();
                let team = insert_team(
                    &mut tx,
                    &name,
                    team_description.as_deref(),
                    &password_hash,
                    None,
                )
                .await?;
                RegisteredTeam { team, is_new: true }
            }
            RegistrationRequest::Join {
                team_id,
                team_password,
                ..
            } => {
                let team = fetch_team(&mut tx, team_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Team {} not found", team_id)))?;

                let snapshot = capacity_snapshot(&mut tx, Some(&team)).await?;
                if let Some(current) = snapshot.team_members {
                    if current >= snapshot.max_team_size {
                        return Err(AppError::Capacity {
                            message: format!("Team '{}' is full", team.name),
                            remaining: 0,
                        });
                    }
                }
                if !auth::verify_password(team_password, &team.password_hash) {
                    tracing::warn!(team_id = %team.id, "Join rejected: wrong team password");
                    return Err(AppError::Unauthorized("Invalid team password".to_string()));
                }

                check_capacity(&snapshot, incoming)?;
                RegisteredTeam {
                    team,
                    is_new: false,
                }
            }
        };

        let mut created = Vec::with_capacity(members.len());
        for member in &members {
            created.push(insert_member(&mut tx, &registered.team.id, member).await?);
        }
        tx.commit().await?;

        tracing::info!(
            team_id = %registered.team.id,
            is_new = registered.is_new,
            members = created.len(),
            "Registration committed"
        );

        Ok(Registration {
            team: registered,
            members: created,
        })
    }
}
