//! Room key construction. Group rooms are keyed by faculty name; private
//! sessions by the canonical sorted pair of participant ids, so whichever
//! side opens the conversation lands in the same room.

use uuid::Uuid;

use atrium_types::models::pair_key;

pub fn faculty_room(faculty: &str) -> String {
    format!("faculty:{faculty}")
}

pub fn private_room(a: Uuid, b: Uuid) -> String {
    format!("private:{}", pair_key(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_room_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(private_room(a, b), private_room(b, a));
    }

    #[test]
    fn key_spaces_do_not_collide() {
        let a = Uuid::new_v4();
        assert!(faculty_room("Physics").starts_with("faculty:"));
        assert!(private_room(a, a).starts_with("private:"));
    }
}
