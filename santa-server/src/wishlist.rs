use santa_common::{Keyed, UserId, WishlistItem};
use serde_json::Value;
use tracing::info;

use crate::error::{SantaError, SantaResult};
use crate::store::{decode_children, Subscription};
use crate::{paths, State};

pub fn add(state: &State, owner: &UserId, item: WishlistItem) -> SantaResult<String> {
    if item.name.trim().is_empty() {
        return Err(SantaError::Validation("Item name is required".to_string()));
    }
    if !item.price.is_finite() || item.price < 0.0 {
        return Err(SantaError::Validation("Price must be zero or more".to_string()));
    }
    let item = WishlistItem {
        name: item.name.trim().to_string(),
        link: item.link.filter(|link| !link.trim().is_empty()),
        ..item
    };
    let id = state.store().push(&paths::wishlist_of(owner)?, &item)?;
    info!(owner = %owner, item = %id, "wishlist item added");
    Ok(id)
}

pub fn remove(state: &State, owner: &UserId, item_id: &str) -> SantaResult<()> {
    let path = paths::wishlist_of(owner)?.child(item_id)?;
    if !state.store().exists(&path)? {
        return Err(SantaError::NotFound(format!("wishlist item {item_id}")));
    }
    state.store().remove(path)?;
    info!(owner = %owner, item = item_id, "wishlist item removed");
    Ok(())
}

pub fn list(state: &State, owner: &UserId) -> SantaResult<Vec<Keyed<WishlistItem>>> {
    Ok(list_from_snapshot(state.store().get(&paths::wishlist_of(owner)?)?))
}

pub fn list_from_snapshot(snapshot: Value) -> Vec<Keyed<WishlistItem>> {
    decode_children(snapshot)
        .into_iter()
        .map(|(id, value)| Keyed { id, value })
        .collect()
}

pub fn subscribe(state: &State, owner: &UserId) -> SantaResult<Subscription> {
    Ok(state.store().subscribe(paths::wishlist_of(owner)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::state;

    fn item(name: &str, price: f64) -> WishlistItem {
        WishlistItem {
            name: name.to_string(),
            price,
            link: Some("  ".to_string()),
        }
    }

    #[test]
    fn add_list_remove() {
        let state = state();
        let owner = UserId::from("u1");
        let id = add(&state, &owner, item("Scarf", 19.99)).unwrap();
        add(&state, &owner, item("Mittens", 12.0)).unwrap();

        let items = list(&state, &owner).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].value.link, None);

        remove(&state, &owner, &id).unwrap();
        let names: Vec<String> = list(&state, &owner).unwrap().into_iter().map(|i| i.value.name).collect();
        assert_eq!(names, ["Mittens"]);
    }

    #[test]
    fn lists_are_per_owner() {
        let state = state();
        add(&state, &"u1".into(), item("Book", 10.0)).unwrap();
        assert!(list(&state, &"u2".into()).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_items() {
        let state = state();
        let owner = UserId::from("u1");
        assert!(matches!(add(&state, &owner, item(" ", 1.0)), Err(SantaError::Validation(_))));
        assert!(matches!(add(&state, &owner, item("Car", -5.0)), Err(SantaError::Validation(_))));
        assert!(matches!(remove(&state, &owner, "missing"), Err(SantaError::NotFound(_))));
    }
}
