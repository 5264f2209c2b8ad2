use catena::prelude::*;
use std::sync::Arc;

fn main() {
    let list: Arc<LockFreeList<u64>> = Arc::new(LockFreeList::new());

    // Push and pop from 8 threads concurrently.
    let thread_count = 8;
    let mut threads = vec![];

    for thread_no in 0..thread_count {
        let list = list.clone();

        let t = std::thread::Builder::new()
            .name(format!("t_{}", thread_no))
            .spawn(move || {
                for i in 0..100 {
                    list.push_back(thread_no * 100 + i);
                }
                list.remove(&(thread_no * 100));
                let _ = list.try_pop_front();
            })
            .unwrap();

        threads.push(t);
    }

    for t in threads.into_iter() {
        t.join().unwrap();
    }

    println!("{} elements left, front is {}", list.size(), *list.front());
}
