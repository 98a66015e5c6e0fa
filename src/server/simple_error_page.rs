//! Default error page for server-generated responses

use enums::Status;
use server::response::Response;

const PART1: &'static str = "\
    <!DOCTYPE html>\
    <html>\
        <head>\
            <title>\
    ";
const PART2: &'static str = "\
            </title>\
        </head>\
        <body>\
            <h1>\
    ";
const PART3: &'static str = concat!("\
            </h1>\
            <hr>\
            <p>Yours faithfully,<br>\
                tk-serve/", env!("CARGO_PKG_VERSION"), "\
            </p>\
        </body>\
    </html>\
    ");

/// Generates a response with the default error page
pub fn error_response(status: Status) -> Response {
    let code = status.code();
    let reason = status.reason();
    let page = format!("{p1}{code:03} {reason}{p2}{code:03} {reason}{p3}",
        code=code, reason=reason, p1=PART1, p2=PART2, p3=PART3);
    Response::new(status)
        .header("Content-Type", "text/html")
        .body(page)
}

#[cfg(test)]
mod test {
    use enums::Status;
    use server::response::ResponseBody;
    use super::error_response;

    #[test]
    fn page_contains_status() {
        let response = error_response(Status::NotFound);
        assert_eq!(response.status(), Status::NotFound);
        match response.body {
            ResponseBody::Fixed(len, _) => assert!(len > 0),
            _ => panic!("error page must have a fixed-length body"),
        }
    }
}
