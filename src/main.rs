#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    oasis_api::rocket()
}
