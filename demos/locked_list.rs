use catena::prelude::*;

fn main() {
    let list: LockedList<String> = vec!["a", "b", "c"].into_iter().map(String::from).collect();

    list.push_back("d".into());
    list.remove(&"b".to_string());

    {
        // The guard keeps every other operation out while it is alive.
        let guard = list.iter();
        for value in &guard {
            println!("{}", value);
        }
    }

    while let Some(value) = list.try_pop_front() {
        println!("popped {}", value);
    }
}
