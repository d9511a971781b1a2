use concierge_contracts::Notice;

pub const CLASSIFICATION_FAILURE: &str =
    "Sorry, I'm having trouble understanding right now. Please try again in a moment.";
pub const MISSING_BOOKING_DETAILS: &str =
    "I need a few details to complete your booking. What's your name and phone number?";
pub const SLOT_NOT_OFFERED: &str =
    "That time isn't one of the options I offered. Please pick one of the listed times.";
pub const NO_PENDING_BOOKING: &str =
    "There's no appointment waiting for confirmation. Tell me what you'd like to book.";
pub const BOOKING_UNAVAILABLE: &str =
    "Online booking isn't available yet because the salon's scheduling account isn't connected.";
pub const COMMIT_CONFLICT: &str =
    "Sorry, that time was just taken. Please pick another of the available times.";
pub const COMMIT_FAILURE: &str =
    "I couldn't complete that booking. Please try again or pick another time.";
pub const BOOKING_CONFIRMED: &str =
    "Perfect! Your appointment is confirmed. You'll receive a confirmation shortly.";
pub const BOOKING_CANCELLED: &str =
    "No problem, I've set those times aside. Let me know if you'd like to look for something else.";

pub fn for_notice(notice: Notice) -> &'static str {
    match notice {
        Notice::ClassificationFailure => CLASSIFICATION_FAILURE,
        Notice::MissingBookingDetails => MISSING_BOOKING_DETAILS,
        Notice::SlotNotOffered => SLOT_NOT_OFFERED,
        Notice::NoPendingBooking => NO_PENDING_BOOKING,
        Notice::BookingUnavailable => BOOKING_UNAVAILABLE,
        Notice::CommitConflict => COMMIT_CONFLICT,
        Notice::CommitFailure => COMMIT_FAILURE,
        Notice::BookingConfirmed => BOOKING_CONFIRMED,
        Notice::BookingCancelled => BOOKING_CANCELLED,
    }
}
