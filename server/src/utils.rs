use crate::error::ServerError;

/// Longest accepted display name, in characters
pub const MAX_NAME_LEN: usize = 24;

// Palette color for a player, stable for the player's identity
pub fn generate_color(player_id: u32) -> String {
    let colors = ["blue", "red", "green", "purple", "orange", "cyan", "magenta", "yellow"];
    colors[player_id.saturating_sub(1) as usize % colors.len()].to_string()
}

// Normalizes an optional display name from JOIN.
// Blank names become None; names that are too long or contain control
// characters are rejected.
pub fn sanitize_name(name: Option<&str>) -> Result<Option<String>, ServerError> {
    let name = match name.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(name) => name,
    };

    if name.chars().count() > MAX_NAME_LEN || name.chars().any(char::is_control) {
        return Err(ServerError::InvalidName);
    }

    Ok(Some(name.to_string()))
}
